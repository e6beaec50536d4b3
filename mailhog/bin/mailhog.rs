#[cfg(not(unix))]
compile_error!("Only unix targets are currently supported");

use mailhog::{Config, MailHog};
use mailhog_common::{internal, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = Config::load(std::env::var_os("MAILHOG_CONFIG").map(Into::into))?;
    internal!(level = DEBUG, "Loaded configuration: {:?}", config);

    MailHog::new(config).run().await
}
