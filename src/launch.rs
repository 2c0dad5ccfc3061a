use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use argh::FromArgs;
use exitcode::ExitCode;
use framework::signal::{SignalTo, os_signals};
use framework::tls::{Connector, TlsConfig};
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};
use zookeeper_exporter::PKG_VERSION;
use zookeeper_exporter::config::{Config, ConfigError, split_hosts};
use zookeeper_exporter::server::{Exporter, serve};
use zookeeper_exporter::zookeeper::{Collector, Prober};

#[derive(FromArgs)]
#[argh(
    description = "Expose ZooKeeper mntr and ruok statistics as Prometheus metrics",
    help_triggers("-h", "--help")
)]
pub struct RootCommand {
    #[argh(switch, short = 'v', description = "show version")]
    version: bool,

    #[argh(
        option,
        short = 'c',
        long = "config",
        description = "read configuration from a YAML file, flags override it"
    )]
    config: Option<PathBuf>,

    #[argh(
        option,
        description = "address the metrics endpoint listens on, default 0.0.0.0:9141"
    )]
    listen: Option<String>,

    #[argh(option, description = "path metrics are served at, default /metrics")]
    location: Option<String>,

    #[argh(option, description = "timeout of every probe in seconds, default 30")]
    timeout: Option<u64>,

    #[argh(
        option,
        description = "comma separated list of zookeeper servers, e.g. 10.0.0.1:2181,10.0.0.2:2181"
    )]
    zk_hosts: Option<String>,

    #[argh(switch, description = "enable TLS client authentication against zookeeper")]
    zk_tls_auth: bool,

    #[argh(option, description = "client certificate file in PEM format")]
    zk_tls_auth_cert: Option<PathBuf>,

    #[argh(option, description = "client private key file in PEM format")]
    zk_tls_auth_key: Option<PathBuf>,

    #[argh(option, description = "pass phrase of an encrypted private key")]
    zk_tls_auth_key_pass: Option<String>,

    #[argh(
        option,
        description = "how many servers are probed at the same time, default 4"
    )]
    concurrency: Option<usize>,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level"
    )]
    log_level: String,

    #[argh(switch, description = "output logs in JSON format")]
    log_json: bool,
}

impl RootCommand {
    #![allow(clippy::print_stdout)]
    fn show_version(&self) {
        println!("zookeeper-exporter {PKG_VERSION}");
    }

    /// Values of the config file, overridden by the flags given.
    fn build_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(location) = &self.location {
            config.location = location.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(hosts) = &self.zk_hosts {
            config.hosts = split_hosts(hosts);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }

        if self.zk_tls_auth || config.tls.is_some() {
            let mut tls = config.tls.take().unwrap_or_default();
            if let Some(cert) = &self.zk_tls_auth_cert {
                tls.cert = Some(cert.clone());
            }
            if let Some(key) = &self.zk_tls_auth_key {
                tls.key = Some(key.clone());
            }
            if let Some(pass) = &self.zk_tls_auth_key_pass {
                tls.key_pass = Some(pass.clone());
            }

            config.tls = Some(tls);
        }

        Ok(config)
    }

    pub fn run(&self) -> Result<(), ExitCode> {
        if self.version {
            self.show_version();
            return Ok(());
        }

        let levels = std::env::var("ZK_EXPORTER_LOG").unwrap_or_else(|_| self.log_level.clone());
        let color = std::io::stdout().is_terminal();
        framework::trace::init(color, self.log_json, &levels);

        let config = self.build_config().map_err(handle_config_error)?;
        let listen = config.validate().map_err(handle_config_error)?;
        let connector = Connector::new(config.tls.as_ref()).map_err(|err| {
            error!(message = "load tls client identity failed", %err);
            exitcode::CONFIG
        })?;

        let targets = config.targets();
        let prober = Prober::new(connector, config.timeout());
        let exporter = Exporter::new(
            Collector::new(prober, config.concurrency),
            targets.clone(),
            config.location.clone(),
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("zk-exporter-worker")
            .enable_io()
            .enable_time()
            .build()
            .map_err(|err| {
                error!(message = "build tokio runtime failed", %err);
                exitcode::OSERR
            })?;

        runtime.block_on(async move {
            let mut signals = os_signals().map_err(|err| {
                error!(message = "register signal handlers failed", %err);
                exitcode::OSERR
            })?;

            let listener = TcpListener::bind(listen).await.map_err(|err| {
                error!(message = "bind metrics endpoint failed", %listen, %err);
                exitcode::OSERR
            })?;

            info!(
                message = "Start zookeeper exporter",
                version = PKG_VERSION,
                %listen,
                location = %config.location,
                hosts = ?targets,
                tls = ?config.tls.as_ref().map(tls_summary),
                concurrency = config.concurrency,
            );

            let (trigger, shutdown) = oneshot::channel::<()>();
            let server = serve(listener, exporter, async move {
                let _ = shutdown.await;
            });
            tokio::pin!(server);

            let signal = tokio::select! {
                result = &mut server => {
                    return result.map_err(|err| {
                        error!(message = "http server exited", %err);
                        exitcode::SOFTWARE
                    });
                }
                signal = signals.next() => signal.unwrap_or(SignalTo::Shutdown),
            };

            match signal {
                SignalTo::Shutdown => {
                    info!(message = "Shutdown signal received");

                    let _ = trigger.send(());
                    tokio::select! {
                        // graceful shutdown finished
                        _ = server => (),
                        // a second signal shuts the server down immediately
                        _ = signals.next() => (),
                    }
                }

                SignalTo::Quit => {
                    info!(message = "Quit signal received");
                }
            }

            Ok::<(), ExitCode>(())
        })?;

        runtime.shutdown_timeout(Duration::from_secs(5));

        Ok(())
    }
}

fn tls_summary(tls: &TlsConfig) -> String {
    format!(
        "cert={:?} key={:?} encrypted={}",
        tls.cert,
        tls.key,
        tls.key_pass.is_some()
    )
}

fn handle_config_error(err: ConfigError) -> ExitCode {
    error!(message = "configuration error", %err);

    exitcode::CONFIG
}
