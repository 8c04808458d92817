use futures_channel::{mpsc, oneshot};
use futures_util::StreamExt;

use unitlink::UnitLink;

#[cfg(feature = "rt-async-io")]
fn main() {
    if let Err(e) = smol::block_on(run()) {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}

#[cfg(feature = "rt-tokio")]
fn main() {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("init tokio runtime failed: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run()) {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}

/// Print property changes of the units named on the command line, plus polled state changes.
async fn run() -> Result<(), unitlink::Error> {
    let units: Vec<String> = std::env::args().skip(1).collect();
    let link = UnitLink::connect_system().await?;

    let set = link.new_subscription_set();
    for unit in &units {
        set.add(unit).await?;
    }

    let (updates_tx, mut updates) = mpsc::channel(64);
    let (errors_tx, mut errors) = mpsc::channel(8);
    let (_stop, stopped) = oneshot::channel::<()>();
    set.set_properties_subscriber(
        async move {
            let _ = stopped.await;
        },
        updates_tx,
        errors_tx,
    )
    .await?;

    let (mut changes, mut poll_errors) = set.subscribe(std::time::Duration::from_secs(2))?;

    loop {
        futures_util::select! {
            update = updates.next() => match update {
                Some(u) => println!(
                    "{}: active={:?} sub={:?}",
                    u.unit,
                    u.changed.active_state(),
                    u.changed.sub_state()
                ),
                None => break,
            },
            changed = changes.next() => match changed {
                Some(changed) => {
                    for (name, status) in changed {
                        match status {
                            Some(s) => println!("{name}: {}", s.active_state.as_str()),
                            None => println!("{name}: gone"),
                        }
                    }
                }
                None => break,
            },
            err = errors.next() => if let Some(e) = err {
                eprintln!("signal error: {e}");
            },
            err = poll_errors.next() => if let Some(e) = err {
                eprintln!("poll error: {e}");
            },
        }
    }
    Ok(())
}
