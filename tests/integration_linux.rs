#![cfg(target_os = "linux")]

// Linux/systemd integration tests.
//
// These are ignored by default and are intended to be run on a real systemd host:
// - `UNITLINK_ITEST_UNIT`: a safe unit name to restart (e.g. "cron.service" in a test VM)

use std::future::Future;
use std::time::Duration;

use futures_channel::{mpsc, oneshot};
use futures_util::StreamExt;

use unitlink::{UnitLink, UnitStartMode};

fn block_on<T>(fut: impl Future<Output = T>) -> T {
    #[cfg(feature = "rt-async-io")]
    {
        smol::block_on(fut)
    }

    #[cfg(feature = "rt-tokio")]
    {
        let rt = tokio::runtime::Runtime::new().expect("init tokio runtime");
        rt.block_on(fut)
    }
}

fn env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

async fn connect() -> unitlink::Result<Option<UnitLink>> {
    match UnitLink::connect_system().await {
        Ok(link) => Ok(Some(link)),
        Err(unitlink::Error::PermissionDenied { .. }) => {
            eprintln!("permission denied; skipping");
            Ok(None)
        }
        Err(unitlink::Error::BackendUnavailable { .. }) => {
            eprintln!("system bus/systemd unavailable; skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[test]
#[ignore]
fn list_units_read_only() {
    block_on(async {
        let Some(link) = connect().await? else {
            return Ok(());
        };

        let units = link.units().list_units().await?;
        assert!(!units.is_empty(), "expected at least one unit");
        for u in units.iter().take(50) {
            assert!(!u.name.trim().is_empty(), "unit name must not be empty");
            assert!(
                u.unit_path.starts_with("/org/freedesktop/systemd1/unit/"),
                "unexpected unit path: {}",
                u.unit_path
            );

            if u.job_id.is_some() {
                assert!(
                    u.job_path.is_some(),
                    "job_path should exist when job_id exists"
                );
            }
        }

        Ok::<(), unitlink::Error>(())
    })
    .unwrap();
}

#[test]
#[ignore]
fn polling_first_tick_lists_loaded_units() {
    block_on(async {
        let Some(link) = connect().await? else {
            return Ok(());
        };

        let (mut changes, _errors) = link.units().subscribe_units(Duration::from_millis(200))?;
        let first = changes.next().await.expect("first tick");
        assert!(!first.is_empty());
        assert!(first.values().all(Option::is_some));

        Ok::<(), unitlink::Error>(())
    })
    .unwrap();
}

#[test]
#[ignore]
fn restart_and_wait() {
    let unit = match env("UNITLINK_ITEST_UNIT") {
        Some(u) => u,
        None => {
            eprintln!("set UNITLINK_ITEST_UNIT to a safe systemd unit to restart");
            return;
        }
    };

    block_on(async {
        let Some(link) = connect().await? else {
            return Ok(());
        };

        let set = link.new_subscription_set();
        set.add(&unit).await?;
        let (updates_tx, mut updates) = mpsc::channel(64);
        let (errors_tx, _errors) = mpsc::channel(8);
        let (cancel, canceled) = oneshot::channel::<()>();
        set.set_properties_subscriber(
            async move {
                let _ = canceled.await;
            },
            updates_tx,
            errors_tx,
        )
        .await?;

        let outcome = link
            .jobs()
            .submit_with_timeout(
                unitlink::JobRequest::new("RestartUnit", [unit.as_str(), "replace"]),
                Duration::from_secs(30),
            )
            .await?;
        eprintln!("outcome={outcome}");
        assert!(outcome.is_done(), "restart of {unit} ended with {outcome}");

        let update = updates.next().await.expect("properties update for restarted unit");
        assert!(update.unit.starts_with(unit.trim_end_matches(".service")));

        let _ = cancel.send(());
        Ok::<(), unitlink::Error>(())
    })
    .unwrap();
}
