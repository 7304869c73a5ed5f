use anyhow::Result;
use clap::Parser;
use tracing::info;

use emissions_analysis::{
    db, explorer_api::ExplorerApiHttp, log, telemetry,
    telemetry::EmissionsStorePostgres,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long)]
    start_height: i64,
    #[arg(long)]
    end_height: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    log::init();

    let args = Args::parse();

    if args.start_height < 1 {
        anyhow::bail!("start_height must be at least 1, genesis has no predecessor");
    }
    if args.start_height > args.end_height {
        anyhow::bail!("start_height cannot be greater than end_height");
    }

    let db_pool = db::get_db_pool("backfill-emissions").await;
    sqlx::migrate!().run(&db_pool).await?;

    let api = ExplorerApiHttp::from_env();
    let store = EmissionsStorePostgres::new(db_pool);

    info!(
        start_height = args.start_height,
        end_height = args.end_height,
        "backfilling emissions"
    );

    telemetry::backfill_emissions(&api, &store, args.start_height..=args.end_height).await?;

    info!("done backfilling emissions");

    Ok(())
}
