use std::sync::Arc;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use runpad_core::DisplayEvent;
use runpad_core::MiniScriptFactory;
use runpad_core::OverflowPolicy;
use runpad_core::Phase;
use runpad_core::RunpadConfig;
use runpad_core::RunpadError;
use runpad_test_support::ScriptedFactory;
use runpad_test_support::Step;
use runpad_test_support::controller_with;
use runpad_test_support::settle;
use runpad_test_support::wait_for_live_workers;
use runpad_test_support::wait_for_phase;

fn small_block(policy: OverflowPolicy) -> RunpadConfig {
    // eight bytes of payload capacity
    RunpadConfig {
        control_block_bytes: 16,
        overflow_policy: policy,
        ..RunpadConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn input_is_delivered_to_the_blocked_program() {
    let (controller, sink) = controller_with(RunpadConfig::default(), Arc::new(MiniScriptFactory));
    let mut phases = controller.subscribe_phase();
    controller.start("x = input()\nprint(x)").expect("start");

    wait_for_phase(&mut phases, |phase| *phase == Phase::AwaitingInput).await;
    assert_eq!(controller.submit_input("42\n").expect("submit"), 3);

    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(sink.outputs(), vec!["42\n".to_string()]);
    assert_eq!(sink.count(&DisplayEvent::InputEcho("42".to_string())), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prompts_and_multiple_reads_share_one_session() {
    let (controller, sink) = controller_with(RunpadConfig::default(), Arc::new(MiniScriptFactory));
    controller
        .start("a = int(input('a? '))\nb = int(input('b? '))\nprint(a + b)")
        .expect("start");

    for (idx, value) in ["40", "2"].into_iter().enumerate() {
        // The phase stays AwaitingInput between the two reads, so wait on
        // the request events themselves.
        sink.wait_until(|events| {
            events
                .iter()
                .filter(|event| **event == DisplayEvent::InputRequested)
                .count()
                > idx
        })
        .await;
        controller.submit_input(value).expect("submit");
    }

    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(sink.output_text(), "a? b? 42\n".to_string());
    assert_eq!(sink.count(&DisplayEvent::InputRequested), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_while_awaiting_input_unblocks_the_worker() {
    let (controller, sink) = controller_with(RunpadConfig::default(), Arc::new(MiniScriptFactory));
    let mut phases = controller.subscribe_phase();
    controller.start("name = input('name? ')\nprint(name)").expect("start");
    wait_for_phase(&mut phases, |phase| *phase == Phase::AwaitingInput).await;

    assert!(controller.cancel());
    assert_eq!(controller.phase(), Phase::Cancelled);
    wait_for_live_workers(&controller, 0).await;

    assert_matches!(
        controller.submit_input("too late"),
        Err(RunpadError::SessionEnded)
    );
    assert_eq!(sink.outputs(), vec!["name? ".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_without_a_request_is_refused() {
    let (controller, _sink) =
        controller_with(RunpadConfig::default(), Arc::new(MiniScriptFactory));
    assert_matches!(controller.submit_input("1"), Err(RunpadError::NoPendingInput));

    let mut phases = controller.subscribe_phase();
    controller.start("while True: pass").expect("start");
    wait_for_phase(&mut phases, |phase| *phase == Phase::Running).await;
    assert_matches!(controller.submit_input("1"), Err(RunpadError::NoPendingInput));
    assert!(controller.cancel());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_input_is_rejected_and_the_request_stays_open() {
    let (controller, sink) =
        controller_with(small_block(OverflowPolicy::Reject), Arc::new(MiniScriptFactory));
    let mut phases = controller.subscribe_phase();
    controller.start("x = input()\nprint(x)").expect("start");
    wait_for_phase(&mut phases, |phase| *phase == Phase::AwaitingInput).await;

    assert_matches!(
        controller.submit_input("0123456789"),
        Err(RunpadError::PayloadOverflow {
            len: 11,
            capacity: 8
        })
    );
    assert_eq!(controller.phase(), Phase::AwaitingInput);

    controller.submit_input("ok").expect("submit fits");
    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(sink.outputs(), vec!["ok\n".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_input_is_truncated_when_configured() {
    let (controller, sink) =
        controller_with(small_block(OverflowPolicy::Truncate), Arc::new(MiniScriptFactory));
    let mut phases = controller.subscribe_phase();
    controller.start("x = input()\nprint(x)").expect("start");
    wait_for_phase(&mut phases, |phase| *phase == Phase::AwaitingInput).await;

    assert_eq!(controller.submit_input("0123456789").expect("submit"), 8);
    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(sink.outputs(), vec!["0123456\n".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn short_reads_drain_the_staged_line_without_new_requests() {
    let factory = ScriptedFactory::new(vec![Step::ReadChunk(4), Step::ReadChunk(4)]);
    let config = RunpadConfig {
        echo_input: false,
        ..RunpadConfig::default()
    };
    let (controller, sink) = controller_with(config, factory);
    let mut phases = controller.subscribe_phase();
    controller.start("").expect("start");
    wait_for_phase(&mut phases, |phase| *phase == Phase::AwaitingInput).await;

    controller.submit_input("hello").expect("submit");
    assert_eq!(settle(&controller).await, Phase::Completed);
    assert_eq!(
        sink.outputs(),
        vec!["hell".to_string(), "o\n".to_string()]
    );
    assert_eq!(sink.count(&DisplayEvent::InputRequested), 1);
    assert!(
        !sink
            .events()
            .iter()
            .any(|event| matches!(event, DisplayEvent::InputEcho(_)))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unparseable_input_surfaces_as_a_program_error() {
    let (controller, sink) = controller_with(RunpadConfig::default(), Arc::new(MiniScriptFactory));
    let mut phases = controller.subscribe_phase();
    controller.start("x = input()\nprint(int(x) + 1)").expect("start");
    wait_for_phase(&mut phases, |phase| *phase == Phase::AwaitingInput).await;

    controller.submit_input("seven").expect("submit");
    assert_eq!(settle(&controller).await, Phase::Completed);
    assert!(
        sink.output_text().starts_with("ValueError: "),
        "{}",
        sink.output_text()
    );
}
