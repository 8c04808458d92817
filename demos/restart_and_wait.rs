use std::time::Duration;

use unitlink::{JobRequest, UnitLink, UnitStartMode};

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

async fn run() -> Result<(), unitlink::Error> {
    let link = UnitLink::connect_system().await?;

    let outcome = link.jobs().restart("nginx", UnitStartMode::Replace).await?;
    println!("restart: {outcome}");

    // Arbitrary manager methods go through `submit`; bound the wait explicitly.
    let request = JobRequest::new("ReloadOrRestartUnit", ["nginx.service", "replace"]);
    let outcome = link
        .jobs()
        .submit_with_timeout(request, Duration::from_secs(30))
        .await?;
    println!("reload-or-restart: {outcome}");
    Ok(())
}
