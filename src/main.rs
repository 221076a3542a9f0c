use std::path::PathBuf;
use std::sync::Arc;

use rampart::auth::MemoryCredentials;
use rampart::config::Config;
use rampart::log;
use rampart::server::Server;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = Config::load(config_path.as_deref())?;

    let _log = log::init(&cfg.log)?;

    let verifier = Arc::new(MemoryCredentials::new());
    let mut server = Server::new(&cfg, verifier)?;
    server.run()
}
