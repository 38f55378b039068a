#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = cli::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    use anyhow::{anyhow, Context, Result};
    use log::{debug, warn};

    use envmap_viewer::assets::DirectorySource;
    use envmap_viewer::shell::{run_native, WindowInitError};
    use envmap_viewer::{AppContext, HeadlessTarget, LoadQueue, RenderLoop, Variant, ViewerConfig};

    const USAGE: &str = "Usage: envmap-viewer [--variant helmet|skybox] [--config viewer.xml] \
                         [--assets DIR] [--summary-only] [--dump-config]";
    const WINDOW_SIZE: (u32, u32) = (1280, 720);
    const LOAD_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn run() -> Result<()> {
        let options = CliOptions::parse(env::args().skip(1))?;
        let config = options.load_config()?;

        if options.dump_config {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }

        let source = DirectorySource::new(&options.assets);
        if options.summary_only {
            return run_headless(config, source);
        }

        let app = AppContext::new(config.clone(), WINDOW_SIZE.0, WINDOW_SIZE.1, 1.0);
        match run_native(app, source.clone()) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --summary-only mode (set DISPLAY or install a GPU driver to enable rendering)."
                    );
                    run_headless(config, source)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Loads both assets without a window, renders one headless frame and
    /// prints what the viewer would show.
    fn run_headless(config: ViewerConfig, source: DirectorySource) -> Result<()> {
        println!(
            "Loading {} assets from {}",
            config.name,
            source.root().display()
        );
        let mut app = AppContext::new(config, WINDOW_SIZE.0, WINDOW_SIZE.1, 1.0);
        let queue = LoadQueue::new();
        app.start_loading(&queue, source);
        if !queue.wait_idle(LOAD_TIMEOUT) {
            warn!("assets still loading after {LOAD_TIMEOUT:?}; reporting partial state");
        }
        app.apply_load_events(&queue);

        let mut target = HeadlessTarget::new(WINDOW_SIZE.0, WINDOW_SIZE.1);
        let mut render_loop = RenderLoop::new();
        render_loop
            .step(&mut app, &mut target, None)
            .context("headless frame failed")?;

        app.print_summary();
        if let Some(frame) = target.last_frame() {
            println!(
                "Frame: {} meshes, {} refreshed materials",
                frame.meshes, frame.dirty_materials
            );
        }
        Ok(())
    }

    #[derive(Debug, PartialEq)]
    struct CliOptions {
        variant: Variant,
        config: Option<PathBuf>,
        assets: PathBuf,
        summary_only: bool,
        dump_config: bool,
    }

    impl CliOptions {
        fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
            let mut options = Self {
                variant: Variant::default(),
                config: None,
                assets: PathBuf::from("static"),
                summary_only: false,
                dump_config: false,
            };
            let mut args = args.into_iter();
            while let Some(arg) = args.next() {
                let mut value = |flag: &str| {
                    args.next()
                        .ok_or_else(|| anyhow!("{flag} needs a value. {USAGE}"))
                };
                match arg.as_str() {
                    "--variant" => options.variant = value("--variant")?.parse()?,
                    "--config" => options.config = Some(PathBuf::from(value("--config")?)),
                    "--assets" => options.assets = PathBuf::from(value("--assets")?),
                    "--summary-only" => options.summary_only = true,
                    "--dump-config" => options.dump_config = true,
                    other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
                }
            }
            Ok(options)
        }

        fn load_config(&self) -> Result<ViewerConfig> {
            let Some(path) = &self.config else {
                return Ok(ViewerConfig::for_variant(self.variant));
            };
            let xml = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config = ViewerConfig::from_xml(&xml)
                .with_context(|| format!("failed to parse config {}", path.display()))?;
            debug!("loaded viewer config `{}` from {}", config.name, path.display());
            Ok(config)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn parse(args: &[&str]) -> Result<CliOptions> {
            CliOptions::parse(args.iter().map(|arg| arg.to_string()))
        }

        #[test]
        fn defaults_to_the_helmet_variant() {
            let options = parse(&[]).unwrap();
            assert_eq!(options.variant, Variant::Helmet);
            assert_eq!(options.assets, PathBuf::from("static"));
            assert!(!options.summary_only);
        }

        #[test]
        fn parses_flags_and_values() {
            let options = parse(&["--variant", "skybox", "--assets", "/tmp/a", "--summary-only"])
                .unwrap();
            assert_eq!(options.variant, Variant::Skybox);
            assert_eq!(options.assets, PathBuf::from("/tmp/a"));
            assert!(options.summary_only);
        }

        #[test]
        fn rejects_unknown_and_incomplete_arguments() {
            assert!(parse(&["--fast"]).is_err());
            assert!(parse(&["--variant"]).is_err());
            assert!(parse(&["--variant", "teapot"]).is_err());
        }
    }
}
