#![cfg(feature = "test_redis")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::AsyncCommands;
use relay_core::{Job, JobType, PeriodicJob, WorkerPool, WorkerPoolConfig};
use relay_store::RedisPool;

async fn test_pool() -> (RedisPool, String) {
    dotenv::dotenv().ok();
    let redis = RedisPool::new(None, None).expect("creating connection pool");
    let namespace = format!("relay-test-{}", uuid::Uuid::new_v4());
    (redis, namespace)
}

async fn cleanup(redis: &RedisPool, namespace: &str) {
    let mut conn = redis.get().await.expect("cleanup: acquiring connection");
    let pattern = format!("{}:*", namespace);
    let mut cmd = redis::cmd("SCAN");
    let mut iter: redis::AsyncIter<String> = cmd
        .cursor_arg(0)
        .arg("MATCH")
        .arg(&pattern)
        .arg("COUNT")
        .arg(100)
        .clone()
        .iter_async(&mut *conn)
        .await
        .expect("cleanup: scanning keyspace");

    let mut del_cmd = redis::cmd("DEL");
    let mut any = false;
    while let Some(key) = iter.next_item().await {
        any = true;
        del_cmd.arg(key);
    }
    if any {
        let _: () = del_cmd.query_async(&mut *conn).await.expect("cleanup: deleting keys");
    }
}

async fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition did not become true in time");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_until_async<F, Fut>(cond: F, timeout: Duration)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond().await {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition did not become true in time");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn single_handler_succeeds() {
    let (redis, namespace) = test_pool().await;
    let seen = Arc::new(std::sync::Mutex::new(None));
    let seen_clone = seen.clone();

    let job_type = JobType::new(
        "email",
        Arc::new(move |job: Job| {
            let seen = seen_clone.clone();
            async move {
                *seen.lock().unwrap() = Some(job.args["to"].as_str().unwrap().to_string());
                Ok(())
            }
        }),
    );

    let mut pool = WorkerPool::new(
        redis.clone(),
        WorkerPoolConfig::new(namespace.clone(), 2).register(job_type),
    );
    pool.start().await.expect("starting pool");

    pool.enqueue(&Job::new("email", serde_json::json!({"to": "x"})).with_id("e1"))
        .await
        .expect("enqueueing job");

    wait_until(|| seen.lock().unwrap().is_some(), Duration::from_secs(5)).await;
    assert_eq!(seen.lock().unwrap().as_deref(), Some("x"));

    pool.stop().await;
    cleanup(&redis, &namespace).await;
}

#[tokio::test]
async fn handler_failure_goes_to_retry_then_dead() {
    let (redis, namespace) = test_pool().await;
    let job_type = JobType::new(
        "flaky",
        Arc::new(|_job: Job| async move { Err(anyhow::anyhow!("boom")) }),
    )
    .max_fails(2)
    .backoff(|_job| 1);

    let mut pool = WorkerPool::new(
        redis.clone(),
        WorkerPoolConfig::new(namespace.clone(), 1).register(job_type),
    );
    pool.start().await.expect("starting pool");

    pool.enqueue(&Job::new("flaky", serde_json::json!({})).with_id("e2"))
        .await
        .expect("enqueueing job");

    let retry_key = format!("{}:retry", namespace);
    wait_until_async(
        || {
            let redis = redis.clone();
            let retry_key = retry_key.clone();
            async move {
                let mut conn = redis.get().await.unwrap();
                let len: i64 = conn.zcard(&retry_key).await.unwrap_or(0);
                len > 0
            }
        },
        Duration::from_secs(5),
    )
    .await;

    // The first failure's backoff is 1s, so the requeuer's next tick (also
    // 1s by default) puts the job back in front of the same handler, which
    // fails it a second time. With max_fails(2), that second failure must
    // land it in `dead` rather than back in `retry`.
    let dead_key = format!("{}:dead", namespace);
    wait_until_async(
        || {
            let redis = redis.clone();
            let dead_key = dead_key.clone();
            async move {
                let mut conn = redis.get().await.unwrap();
                let len: i64 = conn.zcard(&dead_key).await.unwrap_or(0);
                len > 0
            }
        },
        Duration::from_secs(10),
    )
    .await;

    let mut conn = redis.get().await.unwrap();
    let dead_members: Vec<Vec<u8>> = conn.zrange(&dead_key, 0, -1).await.unwrap();
    assert_eq!(dead_members.len(), 1);
    let dead_job = Job::from_bytes(&dead_members[0]).unwrap();
    assert_eq!(dead_job.id, "e2");
    assert_eq!(dead_job.fails, 2);

    let retry_len: i64 = conn.zcard(&retry_key).await.unwrap_or(0);
    assert_eq!(retry_len, 0);

    pool.stop().await;
    cleanup(&redis, &namespace).await;
}

#[tokio::test]
async fn stray_job_is_dropped_without_retry_or_dead() {
    let (redis, namespace) = test_pool().await;
    // The pool registers and polls the "known" queue, but this job's body
    // names a handler ("gone") nobody registered -- e.g. left behind by a
    // since-renamed job type. The queue's own lock accounting must still
    // balance even though handler dispatch fails.
    let job_type = JobType::new("known", Arc::new(|_job: Job| async move { Ok(()) }));

    let mut pool = WorkerPool::new(
        redis.clone(),
        WorkerPoolConfig::new(namespace.clone(), 1).register(job_type),
    );
    pool.start().await.expect("starting pool");

    let mut conn = redis.get().await.unwrap();
    let job = Job::new("gone", serde_json::json!({})).with_id("stray1");
    let _: () = conn
        .lpush(format!("{}:jobs:known", namespace), job.to_bytes().unwrap())
        .await
        .unwrap();

    let jobs_key = format!("{}:jobs:known", namespace);
    wait_until_async(
        || {
            let redis = redis.clone();
            let jobs_key = jobs_key.clone();
            async move {
                let mut conn = redis.get().await.unwrap();
                let len: i64 = conn.llen(&jobs_key).await.unwrap_or(1);
                len == 0
            }
        },
        Duration::from_secs(5),
    )
    .await;

    let retry_key = format!("{}:retry", namespace);
    let dead_key = format!("{}:dead", namespace);
    let retry_len: i64 = conn.zcard(&retry_key).await.unwrap_or(0);
    let dead_len: i64 = conn.zcard(&dead_key).await.unwrap_or(0);
    assert_eq!(retry_len, 0);
    assert_eq!(dead_len, 0);

    pool.stop().await;
    cleanup(&redis, &namespace).await;
}

#[tokio::test]
async fn concurrency_cap_limits_simultaneous_executions() {
    let (redis, namespace) = test_pool().await;
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let in_flight_clone = in_flight.clone();
    let max_seen_clone = max_seen.clone();

    let job_type = JobType::new(
        "capped",
        Arc::new(move |_job: Job| {
            let in_flight = in_flight_clone.clone();
            let max_seen = max_seen_clone.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }),
    )
    .max_concurrency(1);

    let mut pool = WorkerPool::new(
        redis.clone(),
        WorkerPoolConfig::new(namespace.clone(), 4).register(job_type),
    );
    pool.start().await.expect("starting pool");

    for i in 0..5 {
        pool.enqueue(&Job::new("capped", serde_json::json!({})).with_id(format!("c{i}")))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);

    pool.stop().await;
    cleanup(&redis, &namespace).await;
}

#[tokio::test]
async fn dead_pool_reap_recovers_job_type_the_dead_pool_alone_declared() {
    let (redis, namespace) = test_pool().await;
    let mut conn = redis.get().await.unwrap();

    // Manufacture the state a crashed pool leaves behind directly in Redis,
    // the same way `stray_job_is_dropped_without_retry_or_dead` manufactures
    // a stray job body: a pool id that never ran here, with one in-progress
    // job under "x" (which this test's own pool also registers) and one
    // under "ghost" (which only the dead pool ever declared). The dead
    // pool's heartbeat hash is left in place with its `job_names` field
    // intact but the pool itself is absent from `worker_pools`, so it's
    // found through the unknown-pools path rather than a TTL expiry.
    let dead_pool_id = uuid::Uuid::new_v4().to_string();
    let heartbeat_key = format!("{}:worker_pools:{}", namespace, dead_pool_id);
    let _: () = conn.hset(&heartbeat_key, "job_names", "ghost,x").await.unwrap();

    for name in ["x", "ghost"] {
        let lock_key = format!("{}:jobs:{}:lock", namespace, name);
        let lock_info_key = format!("{}:jobs:{}:lock_info", namespace, name);
        let inprogress_key = format!("{}:jobs:{}:{}:inprogress", namespace, name, dead_pool_id);
        let job = Job::new(name, serde_json::json!({})).with_id(format!("stuck-{name}"));

        let _: () = conn.set(&lock_key, 1).await.unwrap();
        let _: () = conn.hset(&lock_info_key, &dead_pool_id, 1).await.unwrap();
        let _: () = conn.lpush(&inprogress_key, job.to_bytes().unwrap()).await.unwrap();
    }

    let job_type = JobType::new("x", Arc::new(|_job: Job| async move { Ok(()) })).max_concurrency(3);
    let mut config = WorkerPoolConfig::new(namespace.clone(), 1).register(job_type);
    config.reap_period = Duration::from_secs(1);
    let mut pool = WorkerPool::new(redis.clone(), config);
    pool.start().await.expect("starting pool");

    for name in ["x", "ghost"] {
        let ready_key = format!("{}:jobs:{}", namespace, name);
        wait_until_async(
            || {
                let redis = redis.clone();
                let ready_key = ready_key.clone();
                async move {
                    let mut conn = redis.get().await.unwrap();
                    let len: i64 = conn.llen(&ready_key).await.unwrap_or(0);
                    len == 1
                }
            },
            Duration::from_secs(10),
        )
        .await;

        let inprogress_key = format!("{}:jobs:{}:{}:inprogress", namespace, name, dead_pool_id);
        let inprogress_len: i64 = conn.llen(&inprogress_key).await.unwrap_or(-1);
        assert_eq!(inprogress_len, 0, "in-progress list for {name} should be drained");

        let lock_val: i64 = conn.get(format!("{}:jobs:{}:lock", namespace, name)).await.unwrap();
        assert_eq!(lock_val, 0, "lock counter for {name} should be back to zero");
    }

    let has_x_field: bool = conn
        .hexists(format!("{}:jobs:x:lock_info", namespace), &dead_pool_id)
        .await
        .unwrap();
    assert!(!has_x_field, "dangling lock_info field for the dead pool should be removed");

    pool.stop().await;
    cleanup(&redis, &namespace).await;
}

#[tokio::test]
async fn periodic_dedup_executes_once_across_two_pools() {
    let (redis, namespace) = test_pool().await;
    let executions = Arc::new(AtomicUsize::new(0));

    let build_config = || {
        let executions = executions.clone();
        let job_type = JobType::new(
            "tick",
            Arc::new(move |_job: Job| {
                let executions = executions.clone();
                async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        let periodic = PeriodicJob::new("tick", "* * * * * * *", serde_json::json!({})).unwrap();
        let mut config = WorkerPoolConfig::new(namespace.clone(), 2)
            .register(job_type)
            .periodic(periodic);
        config.periodic_enqueue_period = Duration::from_secs(2);
        config.requeue_interval = Duration::from_millis(200);
        config
    };

    let mut pool_a = WorkerPool::new(redis.clone(), build_config());
    let mut pool_b = WorkerPool::new(redis.clone(), build_config());
    pool_a.start().await.expect("starting pool a");
    pool_b.start().await.expect("starting pool b");

    tokio::time::sleep(Duration::from_secs(10)).await;

    let count = executions.load(Ordering::SeqCst);
    assert!((9..=11).contains(&count), "expected 10 +/- 1 executions across the fleet, got {count}");

    pool_a.stop().await;
    pool_b.stop().await;
    cleanup(&redis, &namespace).await;
}
