use anyhow::Result;
use backoff::ExponentialBackoff;
use tracing::{info, warn};

use emissions_analysis::{
    db,
    env::ENV_CONFIG,
    explorer_api::{ExplorerApiHttp, ExplorerError},
    log,
    telemetry::{self, AssembleError, CycleError, EmissionsStorePostgres},
};

fn is_transient(err: &CycleError) -> bool {
    match err {
        CycleError::Height(ExplorerError::Transport { .. }) => true,
        CycleError::Assemble {
            source: AssembleError::Explorer(ExplorerError::Transport { .. }),
            ..
        } => true,
        _ => false,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    log::init();

    let db_pool = db::get_db_pool("track-emissions").await;
    sqlx::migrate!().run(&db_pool).await?;

    let api = ExplorerApiHttp::from_env();
    let store = EmissionsStorePostgres::new(db_pool);

    let outcome = backoff::future::retry(ExponentialBackoff::default(), || async {
        telemetry::track_emissions(
            &api,
            &store,
            ENV_CONFIG.conflict_policy,
            ENV_CONFIG.economics_policy,
        )
        .await
        .map_err(|err| {
            if is_transient(&err) {
                warn!(%err, "transient transport failure, retrying");
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            }
        })
    })
    .await?;

    info!(?outcome, "emissions cycle finished");

    Ok(())
}
