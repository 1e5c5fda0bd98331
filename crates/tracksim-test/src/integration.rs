//! End-to-end scenarios
//!
//! Every test talks to a [`SimulatedPoseServer`](crate::SimulatedPoseServer)
//! over real localhost sockets:
//! - Client connection, broadcast ingestion and record commands
//! - Command rejection, timeout and cancellation
//! - Panel bulk operations and snapshots
//! - A full pick-and-drag of a tool

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use tracksim_core::{
        approx_eq, compose, ActorKey, Aspect, EntityKey, Matrix4, Timestamp, TimestampedPose,
        TrackError,
    };
    use tracksim_runtime::{
        ClientConfig, ExportOptions, JsonPoseMemory, PanelConfig, PositionsClient, ToolPanel,
    };
    use tracksim_state::PoseStore;
    use tracksim_visual::{
        EntityRegistry, HeadlessRenderer, InMemoryPoseMemory, PoseMemory, StaticRegistry, TrackedEntity,
        ViewConfig,
    };

    use crate::{coil, pointer, random_rigid, subject_tracker, translation, wait_until, SimulatedPoseServer};

    const WAIT: Duration = Duration::from_secs(2);

    type Panel = ToolPanel<PositionsClient, HeadlessRenderer>;

    async fn connected(server: &SimulatedPoseServer) -> Arc<PositionsClient> {
        let client = PositionsClient::connect(&server.client_config()).await.unwrap();
        server.wait_for_subscribers(1).await;
        Arc::new(client)
    }

    /// Broadcasts are FIFO: once a fresh marker arrives, every echo of an
    /// earlier record has been applied too
    async fn settle_broadcasts(server: &SimulatedPoseServer, client: &PositionsClient) {
        let key = EntityKey::new("settle_marker");
        let marker = TimestampedPose::identity_now();
        server.publish(key.clone(), marker.clone());
        assert!(wait_until(WAIT, || client.latest(&key).as_ref() == Some(&marker)).await);
    }

    fn panel_over(client: &Arc<PositionsClient>, entities: Vec<TrackedEntity>) -> (Panel, Arc<StaticRegistry>) {
        let registry = Arc::new(StaticRegistry::with_entities(entities));
        let panel = ToolPanel::new(
            Arc::clone(client),
            registry.clone(),
            Arc::new(InMemoryPoseMemory::new()),
            HeadlessRenderer::new(),
            ViewConfig::default(),
        );
        (panel, registry)
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let config = ClientConfig {
            pub_port: server.pub_port(),
            cmd_port: server.cmd_port(),
            ..server.client_config()
        };
        drop(server);
        // give the aborted listeners a moment to close
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = PositionsClient::connect(&config).await.err().unwrap();
        assert!(matches!(err, TrackError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_panel_started_from_config_remembers_poses() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let key = EntityKey::new("a_tracker");
        server.publish(key.clone(), TimestampedPose::now(translation(4.0, 5.0, 6.0)));

        let memory_path = std::env::temp_dir().join(format!(
            "tracksim_started_panel_{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&memory_path);
        let config = PanelConfig {
            client: server.client_config(),
            memory_path: Some(memory_path.clone()),
            ..PanelConfig::default()
        };
        let registry: Arc<dyn EntityRegistry> =
            Arc::new(StaticRegistry::with_entities(vec![pointer("a")]));

        let panel: Panel = ToolPanel::start(&config, registry, HeadlessRenderer::new())
            .await
            .unwrap();
        assert!(wait_until(WAIT, || panel.store().latest(&key).is_some()).await);
        panel.refresh().await;

        let remembered = JsonPoseMemory::open(&memory_path).unwrap().load();
        let transform = remembered[&key].transform.unwrap();
        assert!(approx_eq(&transform, &translation(4.0, 5.0, 6.0), 1e-12));
        std::fs::remove_file(&memory_path).unwrap();
    }

    #[tokio::test]
    async fn test_panel_start_rejects_bad_view_config() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let config = PanelConfig {
            client: server.client_config(),
            subject_opacity: 1.5,
            ..PanelConfig::default()
        };
        let registry: Arc<dyn EntityRegistry> = Arc::new(StaticRegistry::with_entities(vec![]));

        let result: Result<Panel, _> =
            ToolPanel::start(&config, registry, HeadlessRenderer::new()).await;
        assert!(matches!(result, Err(TrackError::Config(_))));
    }

    #[tokio::test]
    async fn test_two_broadcasts_latest_wins() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let client = connected(&server).await;
        let key = EntityKey::new("pointer_tracker");
        let mut changes = client.subscribe();

        server.publish_batch(vec![
            (
                key.clone(),
                TimestampedPose::new(Timestamp::from_secs_f64(1.0), Some(translation(1.0, 0.0, 0.0))),
            ),
            (
                key.clone(),
                TimestampedPose::new(Timestamp::from_secs_f64(2.0), Some(translation(2.0, 0.0, 0.0))),
            ),
        ]);

        changes.changed().await.unwrap();
        assert!(
            wait_until(WAIT, || client.latest(&key).map(|p| p.time)
                == Some(Timestamp::from_secs_f64(2.0)))
            .await
        );
        assert_eq!(client.latest_transform(&key), Some(translation(2.0, 0.0, 0.0)));
    }

    #[tokio::test]
    async fn test_late_subscriber_receives_current_poses() {
        let server = SimulatedPoseServer::start().await.unwrap();
        server.publish("coil_tracker", TimestampedPose::identity_now());

        let client = connected(&server).await;
        let key = EntityKey::new("coil_tracker");
        assert!(wait_until(WAIT, || client.latest(&key).is_some()).await);
    }

    #[tokio::test]
    async fn test_record_is_visible_after_ack() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let client = connected(&server).await;
        let key = EntityKey::new("pointer_tracker");
        let pose = TimestampedPose::now(translation(0.0, 5.0, 0.0));

        client.record_pose(key.clone(), pose.clone()).await.unwrap();

        assert_eq!(client.latest(&key), Some(pose.clone()));
        assert_eq!(server.recorded(), vec![(key, pose)]);
    }

    #[tokio::test]
    async fn test_rejected_record_leaves_cache() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let client = connected(&server).await;
        server.reject_key("locked");

        let err = client
            .record_pose(EntityKey::new("locked"), TimestampedPose::identity_now())
            .await
            .unwrap_err();

        assert!(matches!(err, TrackError::CommandRejected { .. }));
        assert!(err.is_command_error());
        assert!(client.latest(&EntityKey::new("locked")).is_none());

        // the channel is still usable
        client
            .record_pose(EntityKey::new("free"), TimestampedPose::identity_now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_timeout_then_stale_ack_is_ignored() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let config = ClientConfig {
            command_timeout: Duration::from_millis(100),
            ..server.client_config()
        };
        let client = PositionsClient::connect(&config).await.unwrap();
        server.wait_for_subscribers(1).await;

        server.set_reply_delay(Duration::from_millis(300));
        let err = client
            .record_pose(EntityKey::new("slow"), TimestampedPose::identity_now())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::CommandTimeout { .. }));

        server.set_reply_delay(Duration::ZERO);
        // the late ack for "slow" is on its way and must not be taken for the next one
        assert!(wait_until(WAIT, || server.recorded().len() == 1).await);
        let pose = TimestampedPose::now(translation(3.0, 0.0, 0.0));
        client
            .record_pose(EntityKey::new("fast"), pose.clone())
            .await
            .unwrap();
        assert_eq!(client.latest(&EntityKey::new("fast")), Some(pose));
    }

    #[tokio::test]
    async fn test_cancelled_record_does_not_touch_cache() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let client = connected(&server).await;
        server.set_reply_delay(Duration::from_millis(200));

        let key = EntityKey::new("cancelled");
        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            client.record_pose(key.clone(), TimestampedPose::identity_now()),
        )
        .await;

        assert!(outcome.is_err());
        assert!(client.latest(&key).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clear_all_three_entities() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let client = connected(&server).await;
        let (panel, _) = panel_over(&client, vec![pointer("a"), pointer("b"), coil("c")]);

        assert_eq!(panel.clear_all_positions().unwrap(), 3);

        let recorded = server.recorded();
        assert_eq!(recorded.len(), 3);
        assert!(recorded.iter().all(|(_, pose)| pose.transform.is_none()));
        for key in ["a_tracker", "b_tracker", "c_tracker"] {
            let pose = client.latest(&EntityKey::new(key)).unwrap();
            assert!(pose.transform.is_none());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_all_skips_relative_pose() {
        let server = SimulatedPoseServer::start().await.unwrap();
        server.publish(
            "b_tracker",
            TimestampedPose::now(translation(1.0, 1.0, 1.0)).with_relative_to("a_tracker"),
        );
        let client = connected(&server).await;
        let relative_key = EntityKey::new("b_tracker");
        assert!(wait_until(WAIT, || client.latest(&relative_key).is_some()).await);

        let (panel, _) = panel_over(&client, vec![pointer("a"), pointer("b")]);
        assert_eq!(panel.zero_all_positions().unwrap(), 1);

        assert_eq!(
            client.latest_transform(&EntityKey::new("a_tracker")),
            Some(Matrix4::identity())
        );
        assert_eq!(
            client.latest_transform(&relative_key),
            Some(translation(1.0, 1.0, 1.0))
        );
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_through_server() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let client = connected(&server).await;
        let (panel, _) = panel_over(&client, vec![pointer("a"), coil("b")]);

        let mut rng = StdRng::seed_from_u64(7);
        let a = random_rigid(&mut rng);
        let b = random_rigid(&mut rng);
        client
            .record_pose(EntityKey::new("a_tracker"), TimestampedPose::now(a))
            .await
            .unwrap();
        client
            .record_pose(EntityKey::new("b_tracker"), TimestampedPose::now(b))
            .await
            .unwrap();

        let dir = std::env::temp_dir().join(format!("tracksim_e2e_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = panel.export_snapshot_to_dir(&dir, ExportOptions::default()).unwrap();

        // wipe, then restore from the file
        client
            .record_pose(EntityKey::new("a_tracker"), TimestampedPose::absent_now())
            .await
            .unwrap();
        assert_eq!(panel.import_snapshot_file(&path).await.unwrap(), 2);
        settle_broadcasts(&server, &client).await;

        let restored = client.latest_transform(&EntityKey::new("a_tracker")).unwrap();
        assert!(approx_eq(&restored, &a, 1e-12));
        let restored = client.latest_transform(&EntityKey::new("b_tracker")).unwrap();
        assert!(approx_eq(&restored, &b, 1e-12));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drag_tool_end_to_end() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let tracker_pose = translation(10.0, 20.0, 30.0);
        server.publish("coil_tracker", TimestampedPose::now(tracker_pose));
        let client = connected(&server).await;
        let tracker_key = EntityKey::new("coil_tracker");
        assert!(wait_until(WAIT, || client.latest(&tracker_key).is_some()).await);

        let entity = coil("coil");
        let offset = entity.static_offset(Aspect::Tool).unwrap();
        let (panel, _) = panel_over(&client, vec![entity, subject_tracker("subject")]);
        panel.finish_initialization().await;
        let refresh_loop = panel.spawn_refresh_loop().unwrap();

        let actor_key = ActorKey::new(&EntityKey::new("coil"), Aspect::Tool);
        let handle = panel.bindings().lock().get(&actor_key).unwrap().handle;
        {
            let renderer = panel.renderer();
            let renderer = renderer.lock();
            let actor = renderer.actor(handle).unwrap();
            assert!(actor.visible);
            assert!(approx_eq(&actor.transform, &compose(&[offset, tracker_pose]), 1e-9));
        }

        let mut rng = StdRng::seed_from_u64(42);
        let drops: Vec<Matrix4> = (0..5).map(|_| random_rigid(&mut rng)).collect();
        let target = *drops.last().unwrap();
        panel.renderer().lock().queue_pick(Some(handle));
        panel.renderer().lock().queue_drag(drops);

        let summary = panel.select_and_move(None).await.unwrap();
        assert_eq!(summary.commits, 5);
        assert_eq!(summary.tracker_key, tracker_key);
        assert_eq!(server.recorded().len(), 5);
        settle_broadcasts(&server, &client).await;

        // the stored tracker pose reproduces the drop location
        let stored = client.latest_transform(&tracker_key).unwrap();
        assert!(approx_eq(&compose(&[offset, stored]), &target, 1e-9));

        // once released, the refresh loop keeps the actor at the drop location
        panel.refresh().await;
        let renderer = panel.renderer();
        let transform = renderer.lock().actor(handle).unwrap().transform;
        assert!(approx_eq(&transform, &target, 1e-9));
        assert_eq!(panel.bindings().lock().moving_count(), 0);

        refresh_loop.abort();
    }

    #[tokio::test]
    async fn test_clear_single_entity() {
        let server = SimulatedPoseServer::start().await.unwrap();
        let client = connected(&server).await;
        let (panel, _) = panel_over(&client, vec![pointer("a")]);
        client
            .record_pose(EntityKey::new("a_tracker"), TimestampedPose::identity_now())
            .await
            .unwrap();

        panel.clear_entity_pose(&EntityKey::new("a")).await.unwrap();
        settle_broadcasts(&server, &client).await;

        let pose = server.latest(&EntityKey::new("a_tracker")).unwrap();
        assert!(pose.transform.is_none());
        assert!(client.latest_transform(&EntityKey::new("a_tracker")).is_none());
    }
}
