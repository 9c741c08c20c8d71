mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recon_core::config::AppConfig;
use recon_core::models::{CreateMainTaskRequest, TaskStatus};
use recon_core::traits::{FindingCounter, TaskStore};
use recon_core::SchedulerResult;
use recon_dispatcher::{SchedulerDeps, SchedulerService};
use recon_infrastructure::{MemoryStore, MemoryTaskStore};

use common::{harness, report, RecordingNotifier, WS};

async fn fan_out(h: &common::Harness, main_task_id: &str, count: i32) {
    h.create_main(main_task_id, count).await;
    for i in 1..=count {
        h.submit(&format!("{main_task_id}-{i}"), None).await;
    }
    for _ in 1..=count {
        assert!(h.service.poll("w1").await.unwrap().found);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reports_are_all_counted() {
    let h = harness();
    fan_out(&h, "m", 5).await;

    let reporters: Vec<_> = (1..=5)
        .map(|i| {
            let service = h.service.clone();
            tokio::spawn(async move {
                service
                    .report(&report(&format!("m-{i}"), TaskStatus::Success))
                    .await
                    .unwrap()
            })
        })
        .collect();
    let mut all_done = 0;
    for reporter in reporters {
        if reporter.await.unwrap().all_done {
            all_done += 1;
        }
    }

    let task = h.main_task("m").await;
    assert_eq!(task.sub_task_done, 5);
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(task.progress, 100);
    assert!(all_done >= 1);
    assert_eq!(h.notifier.wait_for(1).await.len(), 1);
}

#[tokio::test]
async fn test_last_report_completes_main_task_once() {
    let h = harness();
    fan_out(&h, "m", 5).await;

    for i in 1..=4 {
        let outcome = h
            .service
            .report(&report(&format!("m-{i}"), TaskStatus::Success))
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(!outcome.all_done);
        assert_eq!(outcome.sub_task_done, i);
        assert_eq!(outcome.sub_task_count, 5);

        let task = h.main_task("m").await;
        assert_eq!(task.status, TaskStatus::Started);
        assert_eq!(task.progress, i * 20);
    }

    let outcome = h
        .service
        .report(&report("m-5", TaskStatus::Success))
        .await
        .unwrap();
    assert!(outcome.all_done);
    assert_eq!(outcome.sub_task_done, 5);

    let task = h.main_task("m").await;
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(task.progress, 100);
    assert!(task.end_time.is_some());

    let events = h.notifier.wait_for(1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].task_id, "m");
    assert_eq!(events[0].status, TaskStatus::Success);

    // 重复投递最后一条报告：计数不超过上限，也不会再次通知
    let outcome = h
        .service
        .report(&report("m-5", TaskStatus::Success))
        .await
        .unwrap();
    assert_eq!(outcome.sub_task_done, 5);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.notifier.events().await.len(), 1);
    assert_eq!(h.main_task("m").await.sub_task_done, 5);
}

#[tokio::test]
async fn test_running_sub_unit_report_is_not_counted() {
    let h = harness();
    fan_out(&h, "m", 3).await;

    let mut running = report("m-1", TaskStatus::Started);
    running.phase = Some("portscan".to_string());
    let outcome = h.service.report(&running).await.unwrap();
    assert_eq!(outcome.sub_task_done, 0);
    assert!(!outcome.all_done);

    let task = h.main_task("m").await;
    assert_eq!(task.sub_task_done, 0);
    assert_eq!(task.status, TaskStatus::Started);
    assert_eq!(task.current_phase.as_deref(), Some("portscan"));
}

#[tokio::test]
async fn test_terminal_main_task_still_counts_but_keeps_status() {
    let h = harness();
    fan_out(&h, "m", 2).await;
    h.service.stop_task(WS, "m").await.unwrap();

    let outcome = h
        .service
        .report(&report("m-1", TaskStatus::Success))
        .await
        .unwrap();
    assert_eq!(outcome.sub_task_done, 1);

    let task = h.main_task("m").await;
    assert_eq!(task.sub_task_done, 1);
    assert_eq!(task.status, TaskStatus::Stopped);
}

#[tokio::test]
async fn test_paused_main_task_resumes_on_sub_unit_report() {
    let h = harness();
    fan_out(&h, "m", 3).await;
    h.service
        .report(&report("m-1", TaskStatus::Success))
        .await
        .unwrap();

    // 外部暂停后，子单元继续上报
    h.tasks
        .update_main_task(
            WS,
            "m",
            &recon_core::models::MainTaskPatch {
                status: Some(TaskStatus::Paused),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.service
        .report(&report("m-2", TaskStatus::Failure))
        .await
        .unwrap();

    let task = h.main_task("m").await;
    assert_eq!(task.sub_task_done, 2);
    assert_eq!(task.status, TaskStatus::Started);
    assert_eq!(task.progress, 66);
}

#[tokio::test]
async fn test_single_unit_report_drives_status() {
    let h = harness();
    h.create_main("t1", 1).await;
    h.submit("t1", None).await;
    h.service.poll("w1").await.unwrap();

    let mut paused = report("t1", TaskStatus::Paused);
    paused.result = "{\"cursor\":\"10.0.0.128\"}".to_string();
    let outcome = h.service.report(&paused).await.unwrap();
    assert!(!outcome.all_done);

    let task = h.main_task("t1").await;
    assert_eq!(task.status, TaskStatus::Paused);
    assert_eq!(task.progress, 50);
    assert_eq!(task.task_state.as_deref(), Some("{\"cursor\":\"10.0.0.128\"}"));

    let mut done = report("t1", TaskStatus::Failure);
    done.result = "timeout".to_string();
    let outcome = h.service.report(&done).await.unwrap();
    assert!(outcome.all_done);

    let task = h.main_task("t1").await;
    assert_eq!(task.status, TaskStatus::Failure);
    assert_eq!(task.progress, 100);
    assert_eq!(task.result.as_deref(), Some("timeout"));

    let executor = h
        .tasks
        .find_executor_task(WS, "t1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(executor.status, TaskStatus::Failure);
    assert!(executor.end_time.is_some());

    assert_eq!(h.notifier.wait_for(1).await.len(), 1);
    h.service.report(&done).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.notifier.events().await.len(), 1);
}

#[tokio::test]
async fn test_missing_metadata_falls_back_to_workspace_scan() {
    let h = harness();
    h.service
        .create_main_task(CreateMainTaskRequest {
            workspace_id: "ws-other".to_string(),
            task_id: "legacy".to_string(),
            name: "遗留任务".to_string(),
            target: String::new(),
            profile_id: String::new(),
            org_id: String::new(),
            config: String::new(),
            sub_task_count: 1,
        })
        .await
        .unwrap();

    let outcome = h
        .service
        .report(&report("legacy", TaskStatus::Success))
        .await
        .unwrap();
    assert!(outcome.success);

    let task = h.service.get_main_task("ws-other", "legacy").await.unwrap();
    assert_eq!(task.status, TaskStatus::Success);
}

#[tokio::test]
async fn test_workspace_scan_counts_multi_unit_report() {
    let h = harness();
    h.create_main("batch", 3).await;

    let outcome = h
        .service
        .report(&report("batch", TaskStatus::Success))
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(!outcome.all_done);
    assert_eq!(outcome.sub_task_done, 1);
    assert_eq!(outcome.sub_task_count, 3);
    assert_ne!(h.main_task("batch").await.status, TaskStatus::Success);
}

#[tokio::test]
async fn test_unknown_task_is_ignored() {
    let h = harness();
    let outcome = h
        .service
        .report(&report("ghost-1", TaskStatus::Success))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(!outcome.all_done);
}

struct FixedFindings;

#[async_trait]
impl FindingCounter for FixedFindings {
    async fn count_assets(&self, _workspace_id: &str, _task_id: &str) -> SchedulerResult<u64> {
        Ok(7)
    }

    async fn count_vulnerabilities(
        &self,
        _workspace_id: &str,
        _task_id: &str,
    ) -> SchedulerResult<u64> {
        Ok(2)
    }
}

#[tokio::test]
async fn test_notification_carries_finding_counts() {
    let store = Arc::new(MemoryStore::new());
    let tasks = Arc::new(MemoryTaskStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let deps = SchedulerDeps::new(store.clone(), store, tasks, notifier.clone())
        .with_findings(Arc::new(FixedFindings));
    let service = SchedulerService::new(AppConfig::default(), deps);

    service
        .create_main_task(CreateMainTaskRequest {
            workspace_id: WS.to_string(),
            task_id: "t1".to_string(),
            name: "资产扫描".to_string(),
            target: String::new(),
            profile_id: String::new(),
            org_id: String::new(),
            config: String::new(),
            sub_task_count: 1,
        })
        .await
        .unwrap();
    service
        .report(&report("t1", TaskStatus::Success))
        .await
        .unwrap();

    let events = notifier.wait_for(1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].task_name, "资产扫描");
    assert_eq!(events[0].asset_count, 7);
    assert_eq!(events[0].vul_count, 2);
}

#[tokio::test]
async fn test_reports_sharing_main_task_id_are_counted_as_sub_units() {
    // 一个批次启用多个模块时，任务ID与主任务ID相同，但每个模块各报告一次终态
    let h = harness();
    h.create_main("m", 5).await;
    h.submit("m", None).await;
    assert!(h.service.poll("w1").await.unwrap().found);

    let outcome = h
        .service
        .report(&report("m", TaskStatus::Success))
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(!outcome.all_done);
    assert_eq!(outcome.sub_task_done, 1);
    assert_eq!(outcome.sub_task_count, 5);

    let task = h.main_task("m").await;
    assert_eq!(task.status, TaskStatus::Started);
    assert_eq!(task.progress, 20);

    for i in 2..=4 {
        let outcome = h
            .service
            .report(&report("m", TaskStatus::Success))
            .await
            .unwrap();
        assert_eq!(outcome.sub_task_done, i);
        assert!(!outcome.all_done);
    }
    assert!(h.notifier.events().await.is_empty());

    let outcome = h
        .service
        .report(&report("m", TaskStatus::Success))
        .await
        .unwrap();
    assert!(outcome.all_done);
    assert_eq!(outcome.sub_task_done, 5);

    let task = h.main_task("m").await;
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(task.progress, 100);
    assert_eq!(h.notifier.wait_for(1).await.len(), 1);
}
