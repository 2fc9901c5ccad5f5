use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use runpad_core::DisplayEvent;
use runpad_core::HostCapabilities;
use runpad_core::MiniScriptFactory;
use runpad_core::MissingCapability;
use runpad_core::NoticeLevel;
use runpad_core::Phase;
use runpad_core::READY_NOTICE;
use runpad_core::RunpadConfig;
use runpad_core::RunpadError;
use runpad_core::RuntimeError;
use runpad_core::STOPPED_NOTICE;
use runpad_core::SessionController;
use runpad_test_support::RecordingSink;
use runpad_test_support::ScriptedFactory;
use runpad_test_support::Step;
use runpad_test_support::controller_with;
use runpad_test_support::settle;
use runpad_test_support::wait_for_live_workers;
use runpad_test_support::wait_for_phase;

fn mini_script() -> (SessionController, Arc<RecordingSink>) {
    controller_with(RunpadConfig::default(), Arc::new(MiniScriptFactory))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn print_emits_one_fragment_then_completes() {
    let (controller, sink) = mini_script();
    controller.start("print('hi')").expect("start");

    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(sink.outputs(), vec!["hi\n".to_string()]);
    assert_eq!(controller.delivered(), 1);
    assert_eq!(controller.status_label(), "Engine Ready");
    assert_eq!(controller.active_session(), None);

    let events = sink.events();
    assert_matches!(
        &events[0],
        DisplayEvent::Notice(notice) if notice.message == READY_NOTICE && notice.level == NoticeLevel::Success
    );
    assert_eq!(events[1], DisplayEvent::Clear);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn program_errors_are_output_and_the_run_still_completes() {
    let (controller, sink) = mini_script();
    controller
        .start("x = 1\nraise ValueError('bad input')\nprint('unreachable')")
        .expect("start");

    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(
        sink.output_text(),
        "ValueError: bad input (line 2)\n".to_string()
    );
    assert!(sink.notices().iter().all(|n| n.level != NoticeLevel::Error));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deeply_nested_programs_fail_without_taking_the_host_down() {
    let (controller, sink) = mini_script();
    let parens = format!("x = {}1{}\nprint('ok')", "(".repeat(2000), ")".repeat(2000));
    controller.start(&parens).expect("start");
    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(
        sink.output_text(),
        "RecursionError: expression nested too deeply (line 1)\n".to_string()
    );

    let (controller, sink) = mini_script();
    let chain = format!("x = 1{}\nprint(x)", "+1".repeat(20_000));
    controller.start(&chain).expect("start");
    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(sink.output_text(), "20001\n".to_string());
    wait_for_live_workers(&controller, 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_config_is_refused_before_touching_the_console() {
    let config = RunpadConfig {
        control_block_bytes: 4,
        ..RunpadConfig::default()
    };
    let (controller, sink) = controller_with(config, Arc::new(MiniScriptFactory));

    assert_matches!(
        controller.start("print(1)"),
        Err(RunpadError::InvalidConfig(_))
    );
    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(sink.count(&DisplayEvent::Clear), 0);
    assert_eq!(controller.live_workers(), 0);
    assert_eq!(controller.active_session(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_without_a_live_run_is_a_no_op() {
    let (controller, sink) = mini_script();
    assert!(!controller.cancel());
    assert_eq!(controller.phase(), Phase::Idle);

    controller.start("print(1)").expect("start");
    assert_eq!(settle(&controller).await, Phase::Completed);
    assert!(!controller.cancel());
    assert_eq!(controller.phase(), Phase::Completed);
    assert!(
        sink.notices()
            .iter()
            .all(|notice| notice.message != STOPPED_NOTICE)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_loop_is_cancellable() {
    let (controller, sink) = mini_script();
    let id = controller.start("n = 0\nwhile True: n = n + 1").expect("start");
    assert_eq!(controller.active_session(), Some(id));
    assert_eq!(controller.status_label(), "Running...");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(controller.cancel());
    assert_eq!(controller.phase(), Phase::Cancelled);
    assert_eq!(controller.status_label(), "Interrupted");
    assert_eq!(controller.active_session(), None);
    wait_for_live_workers(&controller, 0).await;

    let stopped = sink
        .notices()
        .into_iter()
        .filter(|notice| notice.message == STOPPED_NOTICE)
        .count();
    assert_eq!(stopped, 1);
    assert!(!controller.cancel());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_tears_down_the_previous_worker() {
    let (controller, sink) = mini_script();
    let first = controller.start("while True: pass").expect("first start");
    wait_for_live_workers(&controller, 1).await;

    let mut phases = controller.subscribe_phase();
    let second = controller.start("x = input()\nprint(x)").expect("second start");
    assert_ne!(first, second);
    wait_for_phase(&mut phases, |phase| *phase == Phase::AwaitingInput).await;
    wait_for_live_workers(&controller, 1).await;
    assert_eq!(controller.active_session(), Some(second));

    controller.submit_input("again").expect("submit");
    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(sink.outputs(), vec!["again\n".to_string()]);
    wait_for_live_workers(&controller, 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fragments_arrive_in_emission_order_around_input_requests() {
    let factory = ScriptedFactory::new(vec![
        Step::Output("a".to_string()),
        Step::Output(String::new()),
        Step::Output("b".to_string()),
        Step::EchoLine,
        Step::Output("c".to_string()),
    ]);
    let (controller, sink) = controller_with(RunpadConfig::default(), factory);
    let mut phases = controller.subscribe_phase();
    controller.start("").expect("start");

    wait_for_phase(&mut phases, |phase| *phase == Phase::AwaitingInput).await;
    assert_eq!(controller.status_label(), "Waiting for input");
    controller.submit_input("x").expect("submit");
    assert_eq!(settle(&controller).await, Phase::Completed);

    let traffic: Vec<DisplayEvent> = sink
        .events()
        .into_iter()
        .filter(|event| !matches!(event, DisplayEvent::Notice(_) | DisplayEvent::Clear))
        .collect();
    assert_eq!(
        traffic,
        vec![
            DisplayEvent::Output("a".to_string()),
            DisplayEvent::Output("b".to_string()),
            DisplayEvent::InputRequested,
            DisplayEvent::InputEcho("x".to_string()),
            DisplayEvent::Output("echo:x\n".to_string()),
            DisplayEvent::Output("c".to_string()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_panic_is_reported_as_cancelled() {
    let factory = ScriptedFactory::new(vec![
        Step::Output("before".to_string()),
        Step::Panic("runtime blew up".to_string()),
    ]);
    let (controller, sink) = controller_with(RunpadConfig::default(), factory);
    controller.start("").expect("start");

    assert_eq!(settle(&controller).await, Phase::Cancelled);
    assert_eq!(sink.outputs(), vec!["before".to_string()]);
    let errors: Vec<String> = sink
        .notices()
        .into_iter()
        .filter(|notice| notice.level == NoticeLevel::Error)
        .map(|notice| notice.message)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("unexpectedly"), "{errors:?}");
    wait_for_live_workers(&controller, 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interpreter_failures_render_like_program_errors() {
    let factory = ScriptedFactory::new(vec![Step::Fail(RuntimeError::new(
        "ImportError",
        "no module named 'numpy'",
    ))]);
    let (controller, sink) = controller_with(RunpadConfig::default(), factory);
    controller.start("import numpy").expect("start");

    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(
        sink.output_text(),
        "ImportError: no module named 'numpy'\n".to_string()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_capability_refuses_to_start() {
    let sink = RecordingSink::new();
    let controller = SessionController::with_capabilities(
        RunpadConfig::default(),
        Arc::new(MiniScriptFactory),
        sink.clone(),
        HostCapabilities::none(),
    );

    assert_matches!(
        controller.start("print('hi')"),
        Err(RunpadError::CapabilityUnavailable {
            missing: MissingCapability::ThreadsAndAtomicWait
        })
    );
    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(controller.status_label(), "SECURITY BLOCKED");
    assert_eq!(controller.live_workers(), 0);
    assert_eq!(sink.notices().len(), 2);
    assert!(sink.outputs().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn console_clearing_follows_configuration() {
    let config = RunpadConfig {
        clear_on_start: false,
        ..RunpadConfig::default()
    };
    let (controller, sink) = controller_with(config, Arc::new(MiniScriptFactory));
    controller.start("pass").expect("start");
    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(sink.count(&DisplayEvent::Clear), 0);

    controller.clear_console();
    assert_eq!(sink.count(&DisplayEvent::Clear), 1);
}
