mod common;

use common::{eventually, linked_pair, system, Counter, CounterError, CounterOp};
use distributed_actors::mock::MockPeer;
use distributed_actors::{ActorSystem, ActorSystemError, InvokeError, SystemConfig};
use std::time::Duration;

async fn mocked(name: &str) -> (ActorSystem, MockPeer) {
    let system = system("caller");
    let mock = MockPeer::attach(&system, name)
        .await
        .expect("Failed to attach mock peer");
    (system, mock)
}

#[tokio::test]
async fn mock_replies_are_decoded_like_real_ones() {
    let (system, mut mock) = mocked("scripted").await;
    mock.expect_invocation("increment").return_ok(&10u64);
    mock.expect_invocation("fail")
        .return_operation_err(&CounterError::Refused("busy".into()));
    mock.expect_invocation("get")
        .return_system_err(ActorSystemError::ActorStopped);

    let counter = system
        .resolve::<Counter>(&mock.identity(Some("counter")))
        .expect("Failed to resolve mocked counter");
    assert_eq!(counter.invoke(CounterOp::Increment(1)).await.unwrap(), 10);
    assert_eq!(
        counter.invoke(CounterOp::Fail("x".into())).await.unwrap_err(),
        InvokeError::Operation(CounterError::Refused("busy".into()))
    );
    assert_eq!(
        counter.invoke(CounterOp::Get).await.unwrap_err(),
        InvokeError::System(ActorSystemError::ActorStopped)
    );

    let selectors: Vec<_> = mock.received().into_iter().map(|e| e.selector).collect();
    assert_eq!(selectors, ["increment", "fail", "get"]);
    mock.verify();
}

#[tokio::test]
async fn wrong_reply_shape_is_a_malformed_payload() {
    let (system, mut mock) = mocked("sloppy").await;
    mock.expect_invocation("get").return_ok("not a number");

    let counter = system.resolve::<Counter>(&mock.identity(None)).unwrap();
    let err = counter.invoke(CounterOp::Get).await.unwrap_err();
    assert!(
        matches!(err, InvokeError::System(ActorSystemError::MalformedPayload(_))),
        "unexpected {err:?}"
    );
}

/// A reply that shows up after the caller gave up is dropped, and the channel stays usable.
#[tokio::test]
async fn timed_out_call_ignores_its_late_reply() {
    let (system, mut mock) = mocked("slow").await;
    mock.expect_invocation("get")
        .reply_after(Duration::from_millis(150))
        .return_ok(&7u64);
    mock.expect_invocation("get").return_ok(&8u64);

    let counter = system.resolve::<Counter>(&mock.identity(None)).unwrap();
    let err = counter
        .invoke_timeout(CounterOp::Get, Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        InvokeError::System(ActorSystemError::TimedOut(Duration::from_millis(20)))
    );

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(system.is_connected(mock.node()));
    assert_eq!(counter.invoke(CounterOp::Get).await.unwrap(), 8);
    mock.verify();
}

#[tokio::test]
async fn default_call_timeout_bounds_remote_calls() {
    let system = ActorSystem::new(
        SystemConfig::default()
            .with_node_name("impatient")
            .with_call_timeout(Some(Duration::from_millis(30))),
    );
    let mut mock = MockPeer::attach(&system, "silent").await.unwrap();
    mock.expect_invocation("sleep").never_reply();

    let counter = system.resolve::<Counter>(&mock.identity(None)).unwrap();
    assert_eq!(
        counter.invoke(CounterOp::Sleep(1)).await.unwrap_err(),
        InvokeError::System(ActorSystemError::TimedOut(Duration::from_millis(30)))
    );
    mock.verify();
}

#[tokio::test]
async fn disconnect_fails_every_pending_call() {
    let (system, mut mock) = mocked("flaky").await;
    for _ in 0..3 {
        mock.expect_invocation("sleep").never_reply();
    }
    let counter = system.resolve::<Counter>(&mock.identity(None)).unwrap();

    let calls: Vec<_> = (0..3)
        .map(|_| {
            let counter = counter.clone();
            tokio::spawn(async move { counter.invoke(CounterOp::Sleep(1)).await })
        })
        .collect();
    eventually(|| mock.received().len() == 3).await;

    mock.disconnect();
    for call in calls {
        assert_eq!(
            call.await.unwrap().unwrap_err(),
            InvokeError::System(ActorSystemError::ChannelClosed)
        );
    }
    eventually(|| !system.is_connected(mock.node())).await;
    assert!(system.peers().is_empty());

    // Calls after the disconnect fail immediately.
    assert_eq!(
        counter.invoke(CounterOp::Get).await.unwrap_err(),
        InvokeError::System(ActorSystemError::ChannelClosed)
    );
    mock.verify();
}

#[tokio::test]
async fn shutdown_fails_pending_calls_and_refuses_new_work() {
    let (system, mut mock) = mocked("doomed").await;
    mock.expect_invocation("sleep").never_reply();
    let counter = system.resolve::<Counter>(&mock.identity(None)).unwrap();

    let pending = tokio::spawn({
        let counter = counter.clone();
        async move { counter.invoke(CounterOp::Sleep(1)).await }
    });
    eventually(|| mock.received().len() == 1).await;

    system.shutdown();
    assert_eq!(
        pending.await.unwrap().unwrap_err(),
        InvokeError::System(ActorSystemError::ShuttingDown)
    );
    assert_eq!(
        counter.invoke(CounterOp::Get).await.unwrap_err(),
        InvokeError::System(ActorSystemError::ShuttingDown)
    );
    assert_eq!(
        system.resolve::<Counter>(&mock.identity(None)).unwrap_err(),
        ActorSystemError::ShuttingDown
    );
    assert_eq!(system.local_actor_count(), 0);
}

#[tokio::test]
async fn peer_shutdown_surfaces_as_channel_closed() {
    let (client, server, server_node) = linked_pair().await;
    let (id, _) = server.create_local_actor(|_, _| Counter::default()).unwrap();
    let counter = client.resolve::<Counter>(&id).unwrap();

    let pending = tokio::spawn({
        let counter = counter.clone();
        async move { counter.invoke(CounterOp::Sleep(5_000)).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.shutdown();
    assert_eq!(
        pending.await.unwrap().unwrap_err(),
        InvokeError::System(ActorSystemError::ChannelClosed)
    );
    eventually(|| !client.is_connected(&server_node)).await;
}

#[tokio::test]
async fn unexpected_invocations_are_reported() {
    let (system, mock) = mocked("strict").await;
    let counter = system.resolve::<Counter>(&mock.identity(None)).unwrap();

    let err = counter.invoke(CounterOp::Get).await.unwrap_err();
    match err {
        InvokeError::System(ActorSystemError::Remote { kind, .. }) => {
            assert_eq!(kind, "UnexpectedInvocation")
        }
        other => panic!("unexpected {other:?}"),
    }
    let verdict = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| mock.verify()));
    assert!(verdict.is_err());
}
