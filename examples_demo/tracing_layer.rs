use gcp_log_sink::init::{init_tracing_with_config, LayerConfig};
use tracing::{error, info, info_span};

fn main() {
    let config = match LayerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            LayerConfig::default()
        }
    };
    if let Err(e) = init_tracing_with_config(std::io::stdout(), config) {
        eprintln!("{}", e);
        return;
    }

    info!("starting service");

    let span = info_span!("auth", user_id = 42);
    let _guard = span.enter();

    let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "invalid password");
    error!(error = &err as &(dyn std::error::Error + 'static), "authentication failed");
}
