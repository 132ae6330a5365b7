use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Mock, Server};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::Instant;

use pogo_webhooks::{
    to_wire_payload, DeliveryOutcome, DispatchScheduler, Dispatcher, DispatcherConfig,
    EntityChange, EntityKind, EntityQueues, FailureReason, Gym, Pokemon, RayCasting,
    SchedulerConfig, Subscriber, SubscriberRegistry,
};

fn fast_delivery(max_retries: u32) -> DispatcherConfig {
    DispatcherConfig {
        timeout: Duration::from_secs(2),
        max_retries,
        retry_base_ms: 1,
        retry_max_ms: 5,
        retry_jitter_ms: 0,
    }
}

fn scheduler(
    subscribers: Vec<Subscriber>,
    delivery: DispatcherConfig,
    config: SchedulerConfig,
) -> (Arc<EntityQueues>, Arc<DispatchScheduler>) {
    let queues = Arc::new(EntityQueues::new());
    let registry = Arc::new(SubscriberRegistry::with_subscribers(subscribers).unwrap());
    let scheduler = Arc::new(DispatchScheduler::new(
        queues.clone(),
        registry,
        Arc::new(RayCasting),
        Dispatcher::new(delivery),
        config,
    ));
    (queues, scheduler)
}

/// An endpoint that accepts connections and never answers.
async fn hung_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}/hook")
}

async fn wait_until_matched(mock: &Mock, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if mock.matched_async().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    mock.matched_async().await
}

fn pikachu() -> EntityChange {
    EntityChange::Pokemon(Pokemon::new("enc-25", 25, 1.0, 1.0))
}

#[tokio::test]
async fn test_end_to_end_only_enabled_kind_is_sent() {
    let mut server = Server::new_async().await;
    let expected = Value::Array(vec![to_wire_payload(&pikachu()).unwrap()]);
    let mock = server
        .mock("POST", "/test")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(expected))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let subscriber = Subscriber::new("sink", format!("{}/test", server.url()))
        .with_types([EntityKind::Pokemon]);
    let (queues, scheduler) = scheduler(vec![subscriber], fast_delivery(3), SchedulerConfig::default());

    queues.publish(pikachu());
    queues.publish(EntityChange::Gym(Gym::new("g1", 5.0, 5.0, 1)));

    let report = scheduler.tick().await;
    assert_eq!(report.drained, 2);
    assert_eq!(report.deliveries.len(), 1);
    assert_eq!(report.deliveries[0].events, 1);
    assert_eq!(report.deliveries[0].outcome, DeliveryOutcome::Delivered);
    assert_eq!(queues.total_len(), 0);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_subscriber_isolation() {
    let mut failing = Server::new_async().await;
    let mut healthy = Server::new_async().await;

    let failing_mock = failing
        .mock("POST", "/hook")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;
    let healthy_mock = healthy
        .mock("POST", "/hook")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let subscribers = vec![
        Subscriber::new("broken", format!("{}/hook", failing.url())).with_types([EntityKind::Pokemon]),
        Subscriber::new("ok", format!("{}/hook", healthy.url())).with_types([EntityKind::Pokemon]),
    ];
    let (queues, scheduler) = scheduler(subscribers, fast_delivery(1), SchedulerConfig::default());
    queues.publish(pikachu());

    let report = scheduler.tick().await;
    let broken = report.deliveries.iter().find(|r| r.subscriber == "broken").unwrap();
    let ok = report.deliveries.iter().find(|r| r.subscriber == "ok").unwrap();

    assert_eq!(broken.outcome, DeliveryOutcome::Failed(FailureReason::MaxRetriesExceeded));
    assert_eq!(ok.outcome, DeliveryOutcome::Delivered);
    assert_eq!(report.delivered(), 1);

    failing_mock.assert_async().await;
    healthy_mock.assert_async().await;
}

#[tokio::test]
async fn test_retry_exhaustion_then_no_further_attempts() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .with_status(503)
        .expect(4)
        .create_async()
        .await;

    let subscriber = Subscriber::new("down", format!("{}/hook", server.url()))
        .with_types([EntityKind::Pokemon]);
    let (queues, scheduler) = scheduler(vec![subscriber], fast_delivery(3), SchedulerConfig::default());
    queues.publish(pikachu());

    let report = scheduler.tick().await;
    assert_eq!(report.deliveries[0].attempts, 4);

    // Nothing new queued: the failed batch is not retried on later ticks.
    let report = scheduler.tick().await;
    assert!(report.deliveries.is_empty());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let subscriber = Subscriber::new("gone", format!("{}/hook", server.url()))
        .with_types([EntityKind::Pokemon]);
    let (queues, scheduler) = scheduler(vec![subscriber], fast_delivery(3), SchedulerConfig::default());
    queues.publish(pikachu());

    let report = scheduler.tick().await;
    assert_eq!(report.deliveries[0].attempts, 1);
    assert_eq!(
        report.deliveries[0].outcome,
        DeliveryOutcome::Failed(FailureReason::ClientError(404))
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_tick_sends_nothing() {
    let mut server = Server::new_async().await;
    let mock = server.mock("POST", Matcher::Any).expect(0).create_async().await;

    let subscriber = Subscriber::new("idle", server.url()).with_types(EntityKind::ALL);
    let (_queues, scheduler) = scheduler(vec![subscriber], fast_delivery(3), SchedulerConfig::default());

    let report = scheduler.tick().await;
    assert_eq!(report.drained, 0);
    assert!(report.deliveries.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_disabled_and_filtered_subscribers_get_no_request() {
    let mut server = Server::new_async().await;
    let mock = server.mock("POST", Matcher::Any).expect(0).create_async().await;

    let subscribers = vec![
        Subscriber::new("off", server.url())
            .with_types([EntityKind::Pokemon])
            .disabled(),
        Subscriber::new("no-pikachu", server.url())
            .with_types([EntityKind::Pokemon])
            .with_pokemon_ids(["25"]),
    ];
    let (queues, scheduler) = scheduler(subscribers, fast_delivery(0), SchedulerConfig::default());
    queues.publish(pikachu());

    let report = scheduler.tick().await;
    assert_eq!(report.drained, 1);
    assert!(report.deliveries.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unmappable_change_is_dropped_from_batch() {
    let mut server = Server::new_async().await;
    let expected = Value::Array(vec![to_wire_payload(&pikachu()).unwrap()]);
    let mock = server
        .mock("POST", "/hook")
        .match_body(Matcher::Json(expected))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let subscriber = Subscriber::new("sink", format!("{}/hook", server.url()))
        .with_types([EntityKind::Pokemon]);
    let (queues, scheduler) = scheduler(vec![subscriber], fast_delivery(0), SchedulerConfig::default());
    queues.publish(EntityChange::Pokemon(Pokemon::new("bad", 1, f64::NAN, 0.0)));
    queues.publish(pikachu());

    let report = scheduler.tick().await;
    assert_eq!(report.mapping_failures, 1);
    assert_eq!(report.deliveries[0].events, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_sent_memo_suppresses_repeat() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let subscriber = Subscriber::new("sink", format!("{}/hook", server.url()))
        .with_types([EntityKind::Pokemon]);
    let config = SchedulerConfig {
        sent_memo_ttl: Duration::from_secs(60),
        ..Default::default()
    };
    let (queues, scheduler) = scheduler(vec![subscriber], fast_delivery(0), config);

    queues.publish(pikachu());
    let first = scheduler.tick().await;
    assert_eq!(first.delivered(), 1);

    queues.publish(pikachu());
    let second = scheduler.tick().await;
    assert_eq!(second.duplicates, 1);
    assert!(second.deliveries.is_empty());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_running_scheduler_delivers_and_shuts_down() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .with_status(200)
        .expect_at_least(1)
        .create_async()
        .await;

    let subscriber = Subscriber::new("sink", format!("{}/hook", server.url()))
        .with_types([EntityKind::Pokemon]);
    let config = SchedulerConfig {
        interval: Duration::from_millis(50),
        shutdown_grace: Duration::from_secs(1),
        ..Default::default()
    };
    let (queues, scheduler) = scheduler(vec![subscriber], fast_delivery(0), config);
    let mut handle = scheduler.start();
    assert!(handle.is_running());

    queues.publish(pikachu());

    let mut delivered = false;
    for _ in 0..40 {
        if mock.matched_async().await {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(delivered);
    assert_eq!(queues.total_len(), 0);

    handle.shutdown().await;
    assert!(!handle.is_running());
}

#[tokio::test]
async fn test_hung_endpoint_times_out_each_attempt() {
    let subscriber = Subscriber::new("hung", hung_endpoint().await).with_types([EntityKind::Pokemon]);
    let delivery = DispatcherConfig {
        timeout: Duration::from_millis(200),
        ..fast_delivery(1)
    };
    let (queues, scheduler) = scheduler(vec![subscriber], delivery, SchedulerConfig::default());
    queues.publish(pikachu());

    let report = tokio::time::timeout(Duration::from_secs(5), scheduler.tick())
        .await
        .expect("tick hung on an unresponsive endpoint");
    assert_eq!(report.deliveries.len(), 1);
    assert_eq!(report.deliveries[0].attempts, 2);
    assert_eq!(
        report.deliveries[0].outcome,
        DeliveryOutcome::Failed(FailureReason::MaxRetriesExceeded)
    );
}

#[tokio::test]
async fn test_stuck_subscriber_does_not_delay_next_drain() {
    let mut healthy = Server::new_async().await;
    let healthy_mock = healthy
        .mock("POST", "/hook")
        .with_status(200)
        .expect(2)
        .create_async()
        .await;

    let subscribers = vec![
        Subscriber::new("stuck", hung_endpoint().await).with_types([EntityKind::Pokemon]),
        Subscriber::new("ok", format!("{}/hook", healthy.url())).with_types([EntityKind::Pokemon]),
    ];
    let delivery = DispatcherConfig {
        timeout: Duration::from_secs(30),
        ..fast_delivery(0)
    };
    let config = SchedulerConfig {
        interval: Duration::from_millis(50),
        shutdown_grace: Duration::from_millis(100),
        ..Default::default()
    };
    let (queues, scheduler) = scheduler(subscribers, delivery, config);
    let mut handle = scheduler.start();

    queues.publish(pikachu());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(queues.total_len(), 0);

    // The first tick is still waiting on "stuck"; later ticks keep draining.
    queues.publish(EntityChange::Pokemon(Pokemon::new("enc-26", 26, 1.0, 1.0)));
    assert!(wait_until_matched(&healthy_mock, Duration::from_secs(2)).await);
    assert_eq!(queues.total_len(), 0);

    let started = Instant::now();
    handle.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_delay_only_holds_back_its_own_subscriber() {
    let mut delayed = Server::new_async().await;
    let mut prompt = Server::new_async().await;
    let delayed_mock = delayed
        .mock("POST", "/hook")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let prompt_mock = prompt
        .mock("POST", "/hook")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let subscribers = vec![
        Subscriber::new("delayed", format!("{}/hook", delayed.url()))
            .with_types([EntityKind::Pokemon])
            .with_delay(2),
        Subscriber::new("prompt", format!("{}/hook", prompt.url())).with_types([EntityKind::Pokemon]),
    ];
    let config = SchedulerConfig {
        interval: Duration::from_millis(50),
        shutdown_grace: Duration::from_millis(100),
        ..Default::default()
    };
    let (queues, scheduler) = scheduler(subscribers, fast_delivery(0), config);
    let mut handle = scheduler.start();
    queues.publish(pikachu());

    assert!(wait_until_matched(&prompt_mock, Duration::from_secs(1)).await);
    assert!(!delayed_mock.matched_async().await);

    assert!(wait_until_matched(&delayed_mock, Duration::from_secs(4)).await);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_aborts_deliveries_after_grace() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let subscriber = Subscriber::new("late", format!("{}/hook", server.url()))
        .with_types([EntityKind::Pokemon])
        .with_delay(1);
    let config = SchedulerConfig {
        interval: Duration::from_millis(50),
        shutdown_grace: Duration::from_millis(100),
        ..Default::default()
    };
    let (queues, scheduler) = scheduler(vec![subscriber], fast_delivery(0), config);
    let mut handle = scheduler.start();

    queues.publish(pikachu());
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(queues.total_len(), 0);

    let started = Instant::now();
    handle.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    // Past the subscriber's delay: an abandoned delivery would have posted by now.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    mock.assert_async().await;
}
