// =============================================================================
// HEARTH - Renderer core demo
// =============================================================================
//
// Opens a window, brings up the renderer behind it and submits one empty
// command list per frame until the window closes.
//
// INIT FLOW:
// 1. Load config.toml
// 2. Create window
// 3. Instance -> debug messenger -> surface -> GPU selection -> device
// 4. Frame loop: pump events, release -> record -> submit
// 5. Drain queues, tear down in reverse order
//
// =============================================================================

use anyhow::Result;
use hearth::config::Config;
use hearth::core::Application;

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging(&config);
    log::info!("Starting Hearth");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Renderer API: {}", config.renderer.api);

    let mut app = Application::new(config)?;
    app.run()
}

/// Initialize logging; RUST_LOG overrides the configured level
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();
    builder.init();
}
