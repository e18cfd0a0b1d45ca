use distributed_actors::mock::MockPeer;
use distributed_actors::{ActorSystem, ActorSystemError, InvokeError, SystemConfig};
use tictac_sample::bot_actor::{BotError, BotPlayer, BotReply};
use tictac_sample::clients::BotClient;
use tictac_sample::lifecycle::{join, play, serve, BOT_ROLE};
use tictac_sample::model::{GameMove, Mark, Outcome};

fn local_bot(system: &ActorSystem, mark: Mark) -> BotClient {
    let (_, bot) = system
        .create_local_actor(move |_, _| BotPlayer::new(mark))
        .expect("Failed to create bot");
    BotClient::new(bot)
}

/// Two local bots with the same strategy always draw.
#[tokio::test]
async fn local_bots_draw() {
    let system = ActorSystem::default();
    let x = local_bot(&system, Mark::X);
    let o = local_bot(&system, Mark::O);

    assert_eq!(play(&x, &o).await.unwrap(), Outcome::Draw);
    // Bots reset between games.
    assert_eq!(play(&x, &o).await.unwrap(), Outcome::Draw);
    system.shutdown();
}

/// Full end-to-end game: local X against an on-demand O on a TCP server.
#[tokio::test]
async fn client_plays_remote_bot_over_tcp() {
    let (server, addr) = serve(SystemConfig::default().with_node_name("server"), "127.0.0.1:0")
        .await
        .expect("Failed to start server");
    let (client, remote) = join(SystemConfig::default().with_node_name("client"), addr)
        .await
        .expect("Failed to join server");
    assert!(!remote.is_local());
    assert!(remote.identity().has_role(BOT_ROLE));

    let local = local_bot(&client, Mark::X);
    assert_eq!(play(&local, &remote).await.unwrap(), Outcome::Draw);
    assert_eq!(server.local_actor_count(), 1);

    // The remote bot's own errors come back as the same variants.
    let taken = GameMove { position: 4, mark: Mark::X };
    remote.reset().await.unwrap();
    remote.opponent_moved(taken).await.unwrap();
    assert_eq!(
        remote.opponent_moved(taken).await,
        Err(InvokeError::Operation(BotError::SquareTaken(4)))
    );

    client.shutdown();
    server.shutdown();
}

#[tokio::test]
async fn client_maps_mocked_replies() {
    let system = ActorSystem::default();
    let mut mock = MockPeer::attach(&system, "mock-server").await.unwrap();
    let id = mock.identity(Some(BOT_ROLE));
    let bot = BotClient::new(system.resolve::<BotPlayer>(&id).unwrap());

    let mv = GameMove { position: 8, mark: Mark::O };
    mock.expect_invocation("make_move").return_ok(&BotReply::Moved(mv));
    mock.expect_invocation("opponent_moved")
        .return_operation_err(&BotError::GameOver);
    mock.expect_invocation("reset")
        .return_system_err(ActorSystemError::ShuttingDown);
    mock.expect_invocation("make_move")
        .return_ok(&BotReply::Acknowledged);

    assert_eq!(bot.make_move().await, Ok(mv));
    assert_eq!(
        bot.opponent_moved(GameMove { position: 0, mark: Mark::X }).await,
        Err(InvokeError::Operation(BotError::GameOver))
    );
    // Runtime failures stay system errors instead of posing as bot errors.
    assert_eq!(
        bot.reset().await,
        Err(InvokeError::System(ActorSystemError::ShuttingDown))
    );
    match bot.make_move().await {
        Err(InvokeError::System(ActorSystemError::MalformedPayload(_))) => {}
        other => panic!("unexpected {other:?}"),
    }
    mock.verify();
}
