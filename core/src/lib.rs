//! Run interpreted programs on a worker thread that can block on
//! interactive input while the controller side stays asynchronous.

mod capability;
pub mod config;
pub mod control_block;
mod controller;
mod error;
pub mod input_protocol;
pub mod interpreter;
mod phase;
mod relay;
pub mod script;
mod session;
mod session_id;

pub use capability::HostCapabilities;
pub use capability::MissingCapability;
pub use config::ConfigOverrides;
pub use config::RunpadConfig;
pub use config::find_runpad_home;
pub use control_block::ControlBlock;
pub use controller::BLOCKED_LABEL;
pub use controller::READY_NOTICE;
pub use controller::STOPPED_NOTICE;
pub use controller::SessionController;
pub use error::Result;
pub use error::RunpadError;
pub use input_protocol::OverflowPolicy;
pub use interpreter::ExecError;
pub use interpreter::Interpreter;
pub use interpreter::InterpreterFactory;
pub use interpreter::RuntimeError;
pub use interpreter::RuntimeIo;
pub use interpreter::Terminated;
pub use phase::Phase;
pub use relay::ChannelSink;
pub use relay::DisplayEvent;
pub use relay::DisplaySink;
pub use relay::Notice;
pub use relay::NoticeLevel;
pub use relay::OutputRelay;
pub use script::MiniScriptFactory;
pub use session_id::SessionId;
