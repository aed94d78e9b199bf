use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_config::CommandServiceConfig;
use fleet_core::{Clock, Command, CommandReply, ManualClock};
use fleet_dispatcher::{CommandRequest, CommandService};
use fleet_testing_utils::{MockCommandOutput, MockCommandReplyInput};

/// Reply callback invocation seen by a test
#[derive(Debug, Clone)]
struct Recorded {
    correlation_id: String,
    was_sent: bool,
    sent_time: Option<DateTime<Utc>>,
    reply: CommandReply,
}

#[derive(Clone, Default)]
struct ReplyRecorder {
    calls: Arc<Mutex<Vec<Recorded>>>,
}

impl ReplyRecorder {
    fn attach(&self, request: CommandRequest) -> CommandRequest {
        let calls = Arc::clone(&self.calls);
        request.with_reply_callback(move |request, reply| {
            calls.lock().unwrap().push(Recorded {
                correlation_id: request.correlation_id().to_string(),
                was_sent: request.is_sent(),
                sent_time: request.sent_time(),
                reply: reply.clone(),
            });
        })
    }

    fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }
}

struct Fixture {
    output: MockCommandOutput,
    input: MockCommandReplyInput,
    clock: ManualClock,
    recorder: ReplyRecorder,
    service: CommandService,
}

impl Fixture {
    fn new() -> Self {
        Self::with_output(MockCommandOutput::new())
    }

    fn with_output(output: MockCommandOutput) -> Self {
        let input = MockCommandReplyInput::new();
        let clock = ManualClock::frozen_now();
        let service = CommandService::new(Arc::new(output.clone()), Arc::new(input.clone()))
            .with_clock(Arc::new(clock.clone()))
            .with_config(CommandServiceConfig {
                reply_timeout_seconds: 30,
                sync_poll_interval_ms: 1,
            });

        Self {
            output,
            input,
            clock,
            recorder: ReplyRecorder::default(),
            service,
        }
    }

    fn request(&self) -> CommandRequest {
        self.recorder
            .attach(CommandRequest::new("worker1", Command::new("1", "c")))
    }
}

#[tokio::test]
async fn test_process_then_output_send() {
    let mut f = Fixture::new();
    let request = f.request();
    f.service.process(request).await;

    let sent = f.output.sent_commands();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "worker1");
    assert_eq!(sent[0].command, Command::new("1", "c"));
    assert!(!sent[0].is_reply);
}

#[tokio::test]
async fn test_process_then_request_is_sent_at_now() {
    let mut f = Fixture::new();
    let request = f.request();
    f.service.process(request).await;

    let pending = f.service.pending_request("1").expect("request should be pending");
    assert!(pending.is_sent());
    assert_eq!(pending.sent_time(), Some(f.clock.now()));
}

#[tokio::test]
async fn test_process_then_pending_request() {
    let mut f = Fixture::new();
    let request = f.request();
    f.service.process(request).await;

    assert_eq!(f.service.pending_count(), 1);
    assert!(f.service.pending_requests().contains_key("1"));
    assert!(f.recorder.calls().is_empty());
}

#[tokio::test]
async fn test_process_when_send_fails_then_reply_callback_with_error_reply() {
    let mut f = Fixture::with_output(MockCommandOutput::failing_with("m"));
    let request = f.request();
    f.service.process(request).await;

    let calls = f.recorder.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].reply.is_error());
    assert_eq!(calls[0].reply.correlation_id(), "1");
    assert!(calls[0].reply.message().contains('m'));
}

#[tokio::test]
async fn test_process_when_send_fails_then_not_pending_and_not_sent() {
    let mut f = Fixture::with_output(MockCommandOutput::failing_with("m"));
    let request = f.request();
    f.service.process(request).await;

    assert!(f.service.pending_requests().is_empty());
    let calls = f.recorder.calls();
    assert!(!calls[0].was_sent);
    assert_eq!(calls[0].sent_time, None);
}

#[tokio::test]
async fn test_process_duplicate_correlation_id_is_refused() {
    let mut f = Fixture::new();
    let first = f.request();
    f.service.process(first).await;
    let second = f.request();
    f.service.process(second).await;

    assert_eq!(f.output.sent_commands().len(), 1);
    assert_eq!(f.service.pending_count(), 1);
    let calls = f.recorder.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].reply.is_error());
    assert!(!calls[0].was_sent);
}

#[tokio::test]
async fn test_process_sync_waits_for_reply() {
    let mut f = Fixture::new();
    f.input.push_empty();
    f.input.push(CommandReply::success("1", "m"));

    let request = f.request().sync_mode();
    f.service.process(request).await;

    assert!(f.input.poll_count() >= 2);
    let calls = f.recorder.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].reply.is_success());
    assert_eq!(calls[0].reply.message(), "m");
    assert!(f.service.pending_requests().is_empty());
}

#[tokio::test]
async fn test_process_sync_delivers_other_replies_while_waiting() {
    let mut f = Fixture::new();
    let other = f
        .recorder
        .attach(CommandRequest::new("worker2", Command::new("2", "c")));
    f.service.process(other).await;

    f.input.push(CommandReply::success("2", "other"));
    f.input.push_empty();
    f.input.push(CommandReply::success("1", "mine"));

    let request = f.request().sync_mode();
    f.service.process(request).await;

    let calls = f.recorder.calls();
    let ids: Vec<&str> = calls.iter().map(|c| c.correlation_id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1"]);
    assert!(f.service.pending_requests().is_empty());
}

#[tokio::test]
async fn test_process_sync_expires_on_timeout() {
    let input = MockCommandReplyInput::new();
    let service_output = MockCommandOutput::new();
    // 真实时钟，等待超过请求自身的超时
    let mut service = CommandService::new(Arc::new(service_output), Arc::new(input.clone()))
        .with_config(CommandServiceConfig {
            reply_timeout_seconds: 30,
            sync_poll_interval_ms: 1,
        });
    let recorder = ReplyRecorder::default();
    let request = recorder
        .attach(CommandRequest::new("worker1", Command::new("1", "c")))
        .sync_mode()
        .with_reply_timeout(Duration::from_millis(20));

    service.process(request).await;

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].reply.is_error());
    assert_eq!(calls[0].reply.correlation_id(), "1");
    assert!(service.pending_requests().is_empty());
    assert!(input.poll_count() >= 1);
}

#[tokio::test]
async fn test_process_sync_with_injected_clock_expires_once_clock_advances() {
    let input = MockCommandReplyInput::new();
    let clock = ManualClock::frozen_now();
    let mut service = CommandService::new(Arc::new(MockCommandOutput::new()), Arc::new(input.clone()))
        .with_clock(Arc::new(clock.clone()))
        .with_config(CommandServiceConfig {
            reply_timeout_seconds: 30,
            sync_poll_interval_ms: 1,
        });
    let recorder = ReplyRecorder::default();
    let request = recorder
        .attach(CommandRequest::new("worker1", Command::new("1", "c")))
        .sync_mode();

    // 时钟冻结期间同步等待不会结束，拨过超时后才返回
    let advancer = {
        let clock = clock.clone();
        let input = input.clone();
        tokio::spawn(async move {
            while input.poll_count() < 3 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            clock.advance(chrono::Duration::seconds(31));
        })
    };

    tokio::time::timeout(Duration::from_secs(5), service.process(request))
        .await
        .expect("sync wait should end after the clock advances");
    advancer.await.unwrap();

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].reply.message(), "reply timeout");
    assert!(input.poll_count() >= 3);
    assert!(service.pending_requests().is_empty());
}

#[tokio::test]
async fn test_tick_when_reply_then_reply_callback() {
    let mut f = Fixture::new();
    let request = f.request();
    f.service.process(request).await;

    let reply = CommandReply::success("1", "m");
    f.input.repeat(reply.clone());
    f.service.tick().await;

    let calls = f.recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].reply, reply);
    assert_eq!(calls[0].correlation_id, "1");
    assert!(f.service.pending_requests().is_empty());
}

#[tokio::test]
async fn test_tick_delivers_reply_exactly_once() {
    let mut f = Fixture::new();
    let request = f.request();
    f.service.process(request).await;

    f.input.repeat(CommandReply::success("1", "m"));
    f.service.tick().await;
    f.service.tick().await;

    // 超时后也不会再次回调
    f.clock.advance(chrono::Duration::seconds(60));
    f.service.tick().await;

    assert_eq!(f.recorder.calls().len(), 1);
}

#[tokio::test]
async fn test_tick_when_reply_not_correlated_then_ignore() {
    let mut f = Fixture::new();
    let request = f.request();
    f.service.process(request).await;

    f.input.push(CommandReply::success("unknown", "m"));
    f.service.tick().await;

    assert!(f.recorder.calls().is_empty());
    assert_eq!(f.service.pending_count(), 1);
}

#[tokio::test]
async fn test_tick_when_reply_without_pending_requests_then_ignore() {
    let mut f = Fixture::new();
    f.input.repeat(CommandReply::success("1", "m"));
    f.service.tick().await;

    assert!(f.recorder.calls().is_empty());
    assert!(f.service.pending_requests().is_empty());
}

#[tokio::test]
async fn test_tick_drains_at_most_one_reply() {
    let mut f = Fixture::new();
    let first = f.request();
    f.service.process(first).await;
    let second = f
        .recorder
        .attach(CommandRequest::new("worker1", Command::new("2", "c")));
    f.service.process(second).await;

    f.input.push(CommandReply::success("1", "a"));
    f.input.push(CommandReply::success("2", "b"));

    f.service.tick().await;
    assert_eq!(f.recorder.calls().len(), 1);
    assert_eq!(f.service.pending_count(), 1);

    f.service.tick().await;
    assert_eq!(f.recorder.calls().len(), 2);
    assert!(f.service.pending_requests().is_empty());
}

#[tokio::test]
async fn test_tick_when_reply_timeout_then_error_reply_and_remove() {
    let mut f = Fixture::new();
    let request = f.request();
    f.service.process(request).await;

    f.clock.advance(chrono::Duration::seconds(30));
    f.service.tick().await;

    assert!(f.service.pending_requests().is_empty());
    let calls = f.recorder.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].reply.is_error());
    assert_eq!(calls[0].reply.correlation_id(), "1");
    assert_eq!(calls[0].reply.message(), "reply timeout");
}

#[tokio::test]
async fn test_tick_before_timeout_keeps_request() {
    let mut f = Fixture::new();
    let request = f.request();
    f.service.process(request).await;

    f.clock.advance(chrono::Duration::seconds(29));
    f.service.tick().await;

    assert_eq!(f.service.pending_count(), 1);
    assert!(f.recorder.calls().is_empty());
}

#[tokio::test]
async fn test_tick_uses_request_timeout_over_default() {
    let mut f = Fixture::new();
    let request = f.request().with_reply_timeout(Duration::from_secs(5));
    f.service.process(request).await;

    f.clock.advance(chrono::Duration::seconds(5));
    f.service.tick().await;

    assert!(f.service.pending_requests().is_empty());
    assert_eq!(f.recorder.calls().len(), 1);
}

#[tokio::test]
async fn test_tick_when_receive_fails_still_expires() {
    let mut f = Fixture::new();
    let request = f.request();
    f.service.process(request).await;

    f.input.fail_receive_with("broken pipe");
    f.clock.advance(chrono::Duration::seconds(31));
    f.service.tick().await;

    assert!(f.service.pending_requests().is_empty());
    assert!(f.recorder.calls()[0].reply.is_error());
}

#[tokio::test]
async fn test_reply_channel_completes_on_tick() {
    let mut f = Fixture::new();
    let (request, mut rx) =
        CommandRequest::new("worker1", Command::new("1", "c")).with_reply_channel();
    f.service.process(request).await;

    f.input.push(CommandReply::success("1", "ok"));
    f.service.tick().await;

    let reply = rx.try_recv().expect("reply should be delivered");
    assert_eq!(reply.message(), "ok");
}

#[tokio::test]
async fn test_stop_then_command_output_close() {
    let mut f = Fixture::new();
    f.service.stop().await;
    assert_eq!(f.output.close_count(), 1);
}

#[tokio::test]
async fn test_stop_then_command_reply_input_close() {
    let mut f = Fixture::new();
    f.service.stop().await;
    assert_eq!(f.input.close_count(), 1);
}

#[tokio::test]
async fn test_stop_closes_reply_input_even_if_output_close_fails() {
    let mut f = Fixture::new();
    f.output.fail_close_with("closed twice");
    f.service.stop().await;

    assert_eq!(f.output.close_count(), 1);
    assert_eq!(f.input.close_count(), 1);
}

#[tokio::test]
async fn test_stop_abandons_pending_requests_without_callback() {
    let mut f = Fixture::new();
    let request = f.request();
    f.service.process(request).await;
    f.service.stop().await;

    assert!(f.recorder.calls().is_empty());
}
