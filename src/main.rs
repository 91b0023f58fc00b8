#![warn(clippy::all)]

//! radar-loop - plays a radar timeline headlessly.
//!
//! Reads a saved provider metadata document (NOAA time stops or RainViewer
//! `weather-maps.json`), runs the engine on the system clock for a while and
//! logs every frame it shows. Layers "load" after a short simulated delay.
//!
//! ```text
//! radar-loop weather-maps.json --provider rainviewer --seconds 30 --speed 2
//! ```

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use chrono::FixedOffset;
    use clap::{Parser, ValueEnum};
    use futures_executor::LocalPool;
    use futures_util::future::{self, FutureExt, LocalBoxFuture};
    use radar_loop::platform::SystemClock;
    use radar_loop::{
        format_frame_time, Clock, DrawableLayer, EngineCallbacks, EngineConfig, EngineHost,
        LayerFactory, LayerSignals, MetadataClient, ProviderConfig, RadarEngine, RadarError,
        Spawner, WeakRadarEngine,
    };
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::time::Duration;

    /// Serves every metadata request from one file.
    struct FileClient {
        path: PathBuf,
    }

    impl MetadataClient for FileClient {
        fn fetch_json<'a>(
            &'a self,
            _url: &'a str,
        ) -> LocalBoxFuture<'a, Result<serde_json::Value, RadarError>> {
            let result = std::fs::read_to_string(&self.path)
                .map_err(|e| RadarError::Upstream(format!("{}: {}", self.path.display(), e)))
                .and_then(|text| {
                    serde_json::from_str(&text)
                        .map_err(|e| RadarError::Upstream(format!("invalid JSON: {}", e)))
                });
            future::ready(result).boxed_local()
        }
    }

    struct LoggingLayer {
        template: String,
        opacity: Cell<f32>,
        in_view: Cell<bool>,
    }

    impl DrawableLayer for LoggingLayer {
        fn set_opacity(&self, opacity: f32) {
            self.opacity.set(opacity);
        }

        fn add_to_view(&self) {
            self.in_view.set(true);
            log::debug!("+ layer {}", self.template);
        }

        fn remove_from_view(&self) {
            self.in_view.set(false);
            log::debug!("- layer {}", self.template);
        }

        fn in_view(&self) -> bool {
            self.in_view.get()
        }
    }

    /// Layers that become ready after `load_delay`.
    struct LoggingLayerFactory {
        clock: Rc<dyn Clock>,
        spawner: Spawner,
        load_delay: Duration,
    }

    impl LayerFactory for LoggingLayerFactory {
        fn create_layer(
            &self,
            tile_url_template: &str,
            signals: LayerSignals,
        ) -> Rc<dyn DrawableLayer> {
            let sleep = self.clock.sleep(self.load_delay);
            let spawned = futures_util::task::LocalSpawnExt::spawn_local(
                &*self.spawner,
                async move {
                    sleep.await;
                    signals.ready();
                },
            );
            if let Err(e) = spawned {
                log::warn!("Failed to schedule layer load: {}", e);
            }
            Rc::new(LoggingLayer {
                template: tile_url_template.to_string(),
                opacity: Cell::new(0.0),
                in_view: Cell::new(false),
            })
        }
    }

    #[derive(Clone, Copy, Debug, ValueEnum)]
    enum ProviderArg {
        Noaa,
        Rainviewer,
    }

    impl From<ProviderArg> for ProviderConfig {
        fn from(arg: ProviderArg) -> Self {
            match arg {
                ProviderArg::Noaa => ProviderConfig::noaa(),
                ProviderArg::Rainviewer => ProviderConfig::rainviewer(),
            }
        }
    }

    /// Play a saved radar timeline on the system clock
    #[derive(Parser, Debug)]
    #[command(author, version, about, long_about = None)]
    struct Args {
        /// Provider metadata document (NOAA time stops or weather-maps.json)
        #[arg(value_name = "METADATA")]
        metadata: PathBuf,

        /// Format of the metadata document
        #[arg(long, value_enum, default_value_t = ProviderArg::Noaa)]
        provider: ProviderArg,

        /// How long to play before exiting
        #[arg(long, value_name = "N", default_value_t = 10)]
        seconds: u64,

        /// Playback speed multiplier
        #[arg(long, value_name = "X", default_value_t = 1.0)]
        speed: f32,

        /// Offset from UTC used for frame time labels
        #[arg(
            long,
            value_name = "HOURS",
            default_value_t = 0,
            allow_negative_numbers = true,
            value_parser = clap::value_parser!(i32).range(-23..=23)
        )]
        utc_offset: i32,

        /// Engine configuration JSON (missing fields take defaults)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    }

    fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig, String> {
        let Some(path) = path else {
            return Ok(EngineConfig::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        EngineConfig::from_json(&text).map_err(|e| e.to_string())
    }

    pub fn run() -> Result<(), String> {
        let args = Args::parse();
        let config = load_config(args.config.as_ref())?;
        let provider = ProviderConfig::from(args.provider);
        let offset = FixedOffset::east_opt(args.utc_offset * 3600)
            .ok_or_else(|| format!("UTC offset {} out of range", args.utc_offset))?;

        let mut pool = LocalPool::new();
        let spawner: Spawner = Rc::new(pool.spawner());
        let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());

        // Set once the engine exists; labels always read the live timeline.
        let handle: Rc<RefCell<WeakRadarEngine>> = Rc::default();
        let tick_handle = handle.clone();
        let callbacks = EngineCallbacks::new()
            .on_tick(move |index| {
                let Some(engine) = tick_handle.borrow().upgrade() else {
                    return;
                };
                let frames = engine.frames();
                match frames.get(index) {
                    Some(frame) => log::info!(
                        "Frame {}/{} at {}",
                        index + 1,
                        frames.len(),
                        format_frame_time(frame, &offset)
                    ),
                    None => log::info!("Frame {}", index + 1),
                }
            })
            .on_state_change(|change| log::info!("State: {:?}", change))
            .on_load_state_change(|state| {
                if let Some(error) = &state.error {
                    log::warn!("{}", error);
                }
            });

        let engine = RadarEngine::new(
            config,
            EngineHost {
                clock: clock.clone(),
                spawner: spawner.clone(),
                client: Rc::new(FileClient {
                    path: args.metadata.clone(),
                }),
                layers: Rc::new(LoggingLayerFactory {
                    clock: clock.clone(),
                    spawner: spawner.clone(),
                    load_delay: Duration::from_millis(150),
                }),
                store: None,
            },
            callbacks,
        );

        *handle.borrow_mut() = engine.downgrade();
        log::info!(
            "Playing {} ({} imagery)",
            args.metadata.display(),
            provider.provider().attribution()
        );

        let run_for = Duration::from_secs(args.seconds);
        let speed = args.speed;
        let result = pool.run_until(async {
            engine.initialize(provider.clone()).await?;
            engine.set_speed(speed);
            engine.play();
            clock.sleep(run_for).await;
            engine.pause();
            Ok::<(), RadarError>(())
        });
        engine.destroy();

        result.map_err(|e| e.user_message())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use clap::CommandFactory;

        #[test]
        fn test_cli_definition_is_valid() {
            Args::command().debug_assert();
        }

        #[test]
        fn test_defaults() {
            let args = Args::try_parse_from(["radar-loop", "stops.json"]).unwrap();
            assert_eq!(args.metadata, PathBuf::from("stops.json"));
            assert!(matches!(args.provider, ProviderArg::Noaa));
            assert_eq!(args.seconds, 10);
            assert_eq!(args.speed, 1.0);
            assert_eq!(args.utc_offset, 0);
            assert!(args.config.is_none());
        }

        #[test]
        fn test_rainviewer_with_negative_offset() {
            let args = Args::try_parse_from([
                "radar-loop",
                "weather-maps.json",
                "--provider",
                "rainviewer",
                "--utc-offset",
                "-5",
                "--speed",
                "2",
            ])
            .unwrap();
            assert_eq!(
                ProviderConfig::from(args.provider).provider(),
                radar_loop::Provider::RainViewer
            );
            assert_eq!(args.utc_offset, -5);
            assert_eq!(args.speed, 2.0);
        }

        #[test]
        fn test_rejects_bad_values() {
            assert!(Args::try_parse_from(["radar-loop"]).is_err());
            assert!(Args::try_parse_from(["radar-loop", "a.json", "--provider", "radar"]).is_err());
            assert!(Args::try_parse_from(["radar-loop", "a.json", "--utc-offset", "30"]).is_err());
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(message) = native::run() {
        eprintln!("{}", message);
        std::process::exit(1);
    }
}

// The library is the WASM entry point; main is not called on wasm32.
#[cfg(target_arch = "wasm32")]
fn main() {}
