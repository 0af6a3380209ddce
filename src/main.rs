use dotenvy::dotenv;
use tracing::info;

use billing_recon::infra::{
    app::create_app,
    setup::{init_app_state, init_tracing},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let services = init_app_state().await?;

    let bind_addr = services.app_state.config.bind_addr;

    let app = create_app(services.app_state);

    // Spawn the billing scheduler
    tokio::spawn(services.scheduler.run());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Billing service listening at {}", &listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
