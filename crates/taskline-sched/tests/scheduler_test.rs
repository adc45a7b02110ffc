//! Cross-scheduler ordering behavior: urgent-lane preemption, stable static
//! priorities, wait-time aging, and the starvation override.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;

use taskline_sched::{
    AgingConfig, AgingScheduler, DualQueueConfig, DualQueueScheduler, PriorityConfig,
    PriorityScheduler, TaskId,
};

/// Let spawned task wrappers make progress on the current-thread runtime.
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_urgent_lane_drains_before_normal() {
    let scheduler = DualQueueScheduler::new(DualQueueConfig::new().with_concurrency(1));
    let order = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Semaphore::new(0));

    // Occupy the single slot so later adds stay queued.
    let first = {
        let gate = Arc::clone(&gate);
        scheduler.add_normal(move || async move {
            let permit = gate.acquire().await?;
            permit.forget();
            Ok::<_, anyhow::Error>("first")
        })
    };

    let normal = {
        let order = Arc::clone(&order);
        scheduler.add_normal(move || async move {
            order.lock().unwrap().push("normal");
            Ok::<_, anyhow::Error>("normal")
        })
    };
    let urgent = {
        let order = Arc::clone(&order);
        scheduler.add_urgent(move || async move {
            order.lock().unwrap().push("urgent");
            Ok::<_, anyhow::Error>("urgent")
        })
    };
    settle().await;

    let status = scheduler.status();
    assert_eq!(status.running, 1);
    assert_eq!(status.urgent_len, 1);
    assert_eq!(status.normal_len, 1);

    gate.add_permits(1);
    assert_eq!(first.await.unwrap(), "first");
    assert_eq!(urgent.await.unwrap(), "urgent");
    assert_eq!(normal.await.unwrap(), "normal");

    // The urgent task was added last but ran first among the queued.
    assert_eq!(order.lock().unwrap().clone(), vec!["urgent", "normal"]);
}

#[tokio::test]
async fn test_static_priority_orders_descending_with_stable_ties() {
    let scheduler = PriorityScheduler::new(PriorityConfig::new().with_concurrency(1));
    let order = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Semaphore::new(0));

    let add = |name: &'static str, priority: i64| {
        let order = Arc::clone(&order);
        scheduler.add_task(
            move || async move {
                order.lock().unwrap().push(name);
                Ok::<_, anyhow::Error>(())
            },
            priority,
            Some(TaskId::new(name)),
        )
    };

    // Occupy the single slot.
    let first = {
        let gate = Arc::clone(&gate);
        scheduler.add_task(
            move || async move {
                let permit = gate.acquire().await?;
                permit.forget();
                Ok::<_, anyhow::Error>(())
            },
            100,
            Some(TaskId::new("gate")),
        )
    };

    let handles = vec![
        add("low", 1),
        add("high", 5),
        add("mid", 3),
        add("mid2", 3),
        add("high2", 5),
    ];
    settle().await;

    let queued: Vec<String> = scheduler
        .status()
        .queued
        .iter()
        .map(|t| t.id.to_string())
        .collect();
    assert_eq!(queued, vec!["high", "high2", "mid", "mid2", "low"]);

    gate.add_permits(1);
    first.await.unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(
        order.lock().unwrap().clone(),
        vec!["high", "high2", "mid", "mid2", "low"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_wait_time_boosts_priority_up_to_the_cap() {
    let scheduler: AgingScheduler<()> = AgingScheduler::new(AgingConfig::default());
    let gate = Arc::new(Semaphore::new(0));

    // Occupy the single slot.
    let first = {
        let gate = Arc::clone(&gate);
        scheduler.add_task(TaskId::new("gate"), 0.0, move || async move {
            let permit = gate.acquire().await?;
            permit.forget();
            Ok::<_, anyhow::Error>(())
        })
    };
    let waiting = scheduler.add_task(TaskId::new("waiting"), 3.0, || async {
        Ok::<_, anyhow::Error>(())
    });

    tokio::time::advance(Duration::from_millis(500)).await;
    // 3 + 500 ms * 0.005 = 5.5
    let status = scheduler.queue_status();
    assert_eq!(status[0].id.as_str(), "waiting");
    assert!((status[0].priority - 5.5).abs() < 1e-9);

    tokio::time::advance(Duration::from_millis(1500)).await;
    // 2000 ms of waiting hits the boost cap: 3 + 10 = 13
    let status = scheduler.queue_status();
    assert!((status[0].priority - 13.0).abs() < 1e-9);
    assert!(status[0].waiting >= Duration::from_millis(2000));

    gate.add_permits(1);
    first.await.unwrap();
    waiting.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_starved_task_is_scheduled_next() {
    // Disable linear aging so only the hard override can reorder.
    let scheduler = AgingScheduler::new(AgingConfig::default().with_aging_rate(0.0));
    let order = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Semaphore::new(0));

    let first = {
        let gate = Arc::clone(&gate);
        scheduler.add_task(TaskId::new("gate"), 0.0, move || async move {
            let permit = gate.acquire().await?;
            permit.forget();
            Ok::<_, anyhow::Error>(())
        })
    };

    let starved = {
        let order = Arc::clone(&order);
        scheduler.add_task(TaskId::new("starved"), 0.0, move || async move {
            order.lock().unwrap().push("starved");
            Ok::<_, anyhow::Error>(())
        })
    };

    tokio::time::advance(Duration::from_millis(6000)).await;

    // A fresh high-priority task would normally win 9 to 0.
    let fresh = {
        let order = Arc::clone(&order);
        scheduler.add_task(TaskId::new("fresh"), 9.0, move || async move {
            order.lock().unwrap().push("fresh");
            Ok::<_, anyhow::Error>(())
        })
    };

    gate.add_permits(1);
    first.await.unwrap();
    starved.await.unwrap();
    fresh.await.unwrap();

    assert_eq!(order.lock().unwrap().clone(), vec!["starved", "fresh"]);
}

#[tokio::test]
async fn test_higher_priority_insert_jumps_to_front() {
    let scheduler: AgingScheduler<()> = AgingScheduler::new(AgingConfig::default());
    let gate = Arc::new(Semaphore::new(0));

    let first = {
        let gate = Arc::clone(&gate);
        scheduler.add_task(TaskId::new("gate"), 0.0, move || async move {
            let permit = gate.acquire().await?;
            permit.forget();
            Ok::<_, anyhow::Error>(())
        })
    };

    let a = scheduler.add_task(TaskId::new("a"), 1.0, || async {
        Ok::<_, anyhow::Error>(())
    });
    let b = scheduler.add_task(TaskId::new("b"), 5.0, || async {
        Ok::<_, anyhow::Error>(())
    });

    let status = scheduler.queue_status();
    let ids: Vec<String> = status.iter().map(|t| t.id.to_string()).collect();
    assert_eq!(ids, vec!["b", "a"]);

    gate.add_permits(1);
    first.await.unwrap();
    a.await.unwrap();
    b.await.unwrap();
}

#[tokio::test]
async fn test_dual_queue_failure_does_not_stall_the_lane() {
    let scheduler = DualQueueScheduler::new(DualQueueConfig::new().with_concurrency(1));

    let failing = scheduler.add_normal(|| async {
        Err::<&'static str, anyhow::Error>(anyhow::anyhow!("boom"))
    });
    let next = scheduler.add_normal(|| async { Ok::<_, anyhow::Error>("fine") });

    assert!(failing.await.is_err());
    assert_eq!(next.await.unwrap(), "fine");
}
