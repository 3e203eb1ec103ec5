//! Protected and cancellable tasks, panics, and `TaskTree::start`.

use std::future::pending;

use anyhow::anyhow;
use tracing::Level;

use crate::controller::LifecycleController;
use crate::exit::ExitSignal;
use crate::spec::AppSpec;
use crate::task::{TaskError, TaskOptions};
use crate::tests::mocks::{LogCapture, MockApp};

fn controller(app: MockApp) -> LifecycleController<MockApp> {
    LifecycleController::new(AppSpec::new("supervised"), app).unwrap()
}

#[tokio::test]
async fn test_protected_failure_is_absorbed() {
    let app = MockApp::new().on_create(|controller, journal| {
        controller.schedule("flaky", TaskOptions::new().protected(), |_ctx| async {
            Err(TaskError::Failed(anyhow!("flaky failed")))
        });
        let journal = journal.clone();
        controller.schedule("steady", TaskOptions::new(), move |_ctx| async move {
            tokio::task::yield_now().await;
            journal.push("steady:done");
            Ok(())
        });
    });
    let journal = app.journal();
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 0);
    assert!(journal.contains("steady:done"));
    let stats = controller.statistics();
    assert_eq!(stats.faulted(), 1);
    assert_eq!(stats.completed(), 1);
}

#[tokio::test]
async fn test_unprotected_failure_cancels_siblings() {
    let app = MockApp::new().on_create(|controller, _| {
        controller.schedule("forever", TaskOptions::new(), |_ctx| async {
            pending::<()>().await;
            Ok(())
        });
        controller.schedule("broken", TaskOptions::new(), |_ctx| async {
            Err(TaskError::Failed(anyhow!("disk on fire")))
        });
    });
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 1);
    let stats = controller.statistics();
    assert_eq!(stats.faulted(), 1);
    assert_eq!(stats.cancelled(), 1);
    assert_eq!(stats.running(), 0);
}

#[tokio::test]
async fn test_protected_failure_logs_one_error_with_task_name() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let app = MockApp::new().on_create(|controller, _| {
        controller.schedule("flaky", TaskOptions::new().protected(), |_ctx| async {
            Err(TaskError::Failed(anyhow!("flaky failed")))
        });
    });
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 0);
    let errors = logs.at_least(Level::ERROR);
    assert_eq!(errors.len(), 1, "unexpected errors: {errors:?}");
    assert_eq!(errors[0].message, "protected task failed");
    assert_eq!(errors[0].fields["task"], "flaky");
    assert!(errors[0].fields["error"].contains("flaky failed"));
}

#[tokio::test]
async fn test_unprotected_failure_logs_one_error() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let app = MockApp::new().on_create(|controller, _| {
        controller.schedule("forever", TaskOptions::new(), |_ctx| async {
            pending::<()>().await;
            Ok(())
        });
        controller.schedule("broken", TaskOptions::new(), |_ctx| async {
            Err(TaskError::Failed(anyhow!("disk on fire")))
        });
    });
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 1);
    let errors = logs.at_least(Level::ERROR);
    assert_eq!(errors.len(), 1, "unexpected errors: {errors:?}");
    assert_eq!(errors[0].message, "unprotected task failed");
    assert_eq!(errors[0].fields["task"], "broken");
}

#[tokio::test]
async fn test_protected_panic_is_absorbed() {
    let app = MockApp::new().on_create(|controller, journal| {
        controller.schedule("fragile", TaskOptions::new().protected(), |_ctx| async {
            panic!("fragile task exploded");
        });
        let journal = journal.clone();
        controller.schedule("steady", TaskOptions::new(), move |_ctx| async move {
            tokio::task::yield_now().await;
            journal.push("steady:done");
            Ok(())
        });
    });
    let journal = app.journal();
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 0);
    assert!(journal.contains("steady:done"));
    assert_eq!(controller.statistics().faulted(), 1);
}

#[tokio::test]
async fn test_unprotected_panic_is_a_fault() {
    let app = MockApp::new().on_create(|controller, _| {
        controller.schedule("fragile", TaskOptions::new(), |_ctx| async {
            panic!("fragile task exploded");
        });
    });
    let journal = app.journal();
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 1);
    assert_eq!(journal.count("teardown"), 1);
}

#[tokio::test]
async fn test_cancellable_handle_cancels_only_its_task() {
    let app = MockApp::new();
    let journal = app.journal();
    let mut controller = controller(app);

    let victim = controller
        .schedule("victim", TaskOptions::new().cancellable(), |_ctx| async {
            pending::<()>().await;
            Ok(())
        })
        .unwrap();
    assert_eq!(victim.name(), "victim");
    controller.schedule("killer", TaskOptions::new(), move |_ctx| async move {
        tokio::task::yield_now().await;
        victim.cancel();
        Ok(())
    });
    let bystander = journal.clone();
    controller.schedule("bystander", TaskOptions::new(), move |_ctx| async move {
        bystander.push("bystander:done");
        Ok(())
    });

    assert_eq!(controller.run().await, 0);
    assert!(journal.contains("bystander:done"));
    let stats = controller.statistics();
    assert_eq!(stats.cancelled(), 1);
    assert_eq!(stats.completed(), 2);
}

#[tokio::test]
async fn test_cancelled_while_queued_never_starts() {
    let app = MockApp::new();
    let journal = app.journal();
    let mut controller = controller(app);

    let recorder = journal.clone();
    let handle = controller
        .schedule("never", TaskOptions::new().cancellable(), move |_ctx| async move {
            recorder.push("never:ran");
            Ok(())
        })
        .unwrap();
    handle.cancel();
    assert!(handle.is_cancelled());

    assert_eq!(controller.run().await, 0);
    assert!(!journal.contains("never:ran"));
    assert_eq!(controller.statistics().started(), 0);
}

#[tokio::test]
async fn test_protected_exit_still_propagates() {
    let app = MockApp::new().on_create(|controller, _| {
        controller.schedule("forever", TaskOptions::new(), |_ctx| async {
            pending::<()>().await;
            Ok(())
        });
        controller.schedule("quitter", TaskOptions::new().protected(), |_ctx| async {
            Err(TaskError::Exit(ExitSignal::new("done").with_code(4)))
        });
    });
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 4);
    assert_eq!(controller.statistics().cancelled(), 1);
}

#[tokio::test]
async fn test_interrupt_ends_run_cleanly() {
    let app = MockApp::new().on_create(|controller, _| {
        controller.schedule("forever", TaskOptions::new(), |_ctx| async {
            pending::<()>().await;
            Ok(())
        });
        controller.schedule("interrupter", TaskOptions::new().protected(), |_ctx| async {
            Err(TaskError::Interrupted)
        });
    });
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 0);
    assert_eq!(controller.statistics().cancelled(), 1);
}

#[tokio::test]
async fn test_task_observes_tree_cancellation() {
    let app = MockApp::new().on_create(|controller, journal| {
        let journal = journal.clone();
        controller.schedule("watcher", TaskOptions::new(), move |ctx| async move {
            journal.push(format!("watcher:cancelled={}", ctx.is_cancelled()));
            ctx.controller().request_shutdown();
            journal.push(format!("watcher:cancelled={}", ctx.is_cancelled()));
            Ok(())
        });
    });
    let journal = app.journal();
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 0);
    assert_eq!(
        journal.with_prefix("watcher:"),
        ["cancelled=false", "cancelled=true"]
    );
}

#[tokio::test]
async fn test_start_waits_for_started_signal() {
    let app = MockApp::new().on_tree(|tree, journal| async move {
        let task_journal = journal.clone();
        let handle = tree
            .start("bootstrap", TaskOptions::new(), move |_ctx, started| async move {
                task_journal.push("bootstrap:up");
                started.started();
                tokio::task::yield_now().await;
                task_journal.push("bootstrap:done");
                Ok(())
            })
            .await?;
        assert!(handle.is_none());
        journal.push("hook:after-start");
        Ok(())
    });
    let journal = app.journal();
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 0);
    let entries = journal.entries();
    let up = entries.iter().position(|e| e == "bootstrap:up").unwrap();
    let after = entries.iter().position(|e| e == "hook:after-start").unwrap();
    assert!(up < after);
    assert!(journal.contains("bootstrap:done"));
}

#[tokio::test]
async fn test_start_fails_when_task_ends_without_signal() {
    let app = MockApp::new().on_tree(|tree, journal| async move {
        let result = tree
            .start("silent", TaskOptions::new(), |_ctx, _started| async { Ok(()) })
            .await;
        if let Err(error) = result {
            journal.push(format!("start-failed:{error}"));
        }
        Ok(())
    });
    let journal = app.journal();
    let mut controller = controller(app);

    assert_eq!(controller.run().await, 0);
    assert_eq!(
        journal.with_prefix("start-failed:"),
        ["task silent ended before it reported being started"]
    );
}
