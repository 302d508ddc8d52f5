//! storewire demo entry point.
//!
//! Composes the reference application, enrolls a household and prints the
//! resulting store snapshots as JSON.

use std::time::Duration;

use anyhow::Context;
use futures_util::future::try_join_all;

use storewire::clients::RateTable;
use storewire::composition::{CompositionRoot, Dependencies};
use storewire::config::FrameworkConfig;
use storewire::domain::{Dependent, Relationship, UserCommand, UserId};
use storewire::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = FrameworkConfig::from_env().context("loading configuration")?;
    telemetry::init(&config);
    tracing::info!(
        mailbox_capacity = config.store_mailbox_capacity,
        contexts = config.router_contexts.len(),
        "starting storewire"
    );

    let deps = Dependencies::in_memory(&config);
    let mut app = CompositionRoot::compose(&config, deps).context("composing application")?;

    let user_id = UserId::new();
    app.users
        .dispatch(UserCommand::RegisterUser {
            user_id,
            name: "Alex Morgan".to_string(),
        })
        .await?;

    let household = [
        Dependent::new("Sam Morgan", Relationship::Spouse),
        Dependent::new("Riley Morgan", Relationship::Child),
    ];
    try_join_all(household.into_iter().map(|dependent| {
        app.users
            .dispatch(UserCommand::AddDependent { user_id, dependent })
    }))
    .await?;

    let household_size = app
        .users
        .current_state()
        .dependents(user_id)
        .len()
        .saturating_add(1);
    let expected = RateTable::new(
        config.insurance_base_premium_cents,
        config.insurance_dependent_premium_cents,
    )
    .premium_for(household_size);
    let quoted = app
        .insurance
        .wait_for(|state| state.insurance_rate(user_id) == Some(expected));
    tokio::time::timeout(Duration::from_secs(5), quoted)
        .await
        .context("waiting for the insurance quote")??;
    tracing::info!(%user_id, household_size, insurance_rate = %expected, "household quoted");

    // Documents post navigation requests while applying, so settle them first.
    app.documents.settle().await?;
    app.router.settle().await?;

    println!("users:     {}", serde_json::to_string_pretty(&*app.users.current_state())?);
    println!("insurance: {}", serde_json::to_string_pretty(&*app.insurance.current_state())?);
    println!("documents: {}", serde_json::to_string_pretty(&*app.documents.current_state())?);
    println!("router:    {}", serde_json::to_string_pretty(&*app.router.current_state())?);

    app.shutdown();
    tracing::info!("storewire finished");
    Ok(())
}
