/* affect:meta
id: AFF-20261012-full-reset-tool
intent: code
summary: |-
  Offline wipe of the state file: value 0, empty history. Run while the
  service is stopped, otherwise its next save overwrites the result.
*/
use affect_engine::config::AffectConfig;
use affect_engine::persistence::full_reset;
use tracing::error;

fn main() {
    tracing_subscriber::fmt::init();

    let config = AffectConfig::from_env();
    let target = std::env::args().nth(1).map(std::path::PathBuf::from);
    if let Err(err) = full_reset(&config, target) {
        error!("full reset failed: {err}");
        std::process::exit(1);
    }
}
