use std::convert::Infallible;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use tokio::net::TcpListener;

use crate::config::split_hosts;
use crate::zookeeper::{Collector, render};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Serves the metrics of the configured ZooKeeper members, scraped when the
/// endpoint is requested.
pub struct Exporter {
    collector: Collector,
    targets: Vec<String>,
    location: String,
}

impl Exporter {
    pub fn new(collector: Collector, targets: Vec<String>, location: String) -> Self {
        Self {
            collector,
            targets,
            location,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        if req.uri().path() != self.location {
            return empty(StatusCode::NOT_FOUND);
        }

        if req.method() != Method::GET {
            let mut resp = empty(StatusCode::METHOD_NOT_ALLOWED);
            resp.headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET"));
            return resp;
        }

        let start = Instant::now();
        let overridden = query_targets(req.uri().query());
        let targets = if overridden.is_empty() {
            &self.targets
        } else {
            &overridden
        };

        let snapshot = self.collector.collect(targets).await;
        let text = render(&snapshot);

        debug!(
            message = "scrape finished",
            targets = targets.len(),
            metrics = snapshot.len(),
            elapsed = ?start.elapsed(),
        );

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, CONTENT_TYPE);

        let body = if should_compress(req.headers()) {
            match gzip(text.as_bytes()) {
                Ok(compressed) => {
                    builder = builder.header(header::CONTENT_ENCODING, "gzip");
                    Bytes::from(compressed)
                }
                Err(err) => {
                    warn!(message = "compress metrics failed", %err);
                    Bytes::from(text)
                }
            }
        } else {
            Bytes::from(text)
        };

        builder
            .body(Full::new(body))
            .expect("Response build failed")
    }
}

/// Serve the exporter until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, exporter: Exporter, shutdown: F) -> framework::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let exporter = Arc::new(exporter);
    let service = service_fn(move |req: Request<Incoming>| {
        let exporter = Arc::clone(&exporter);
        async move { Ok::<_, Infallible>(exporter.handle(req).await) }
    });

    framework::http::serve(listener, service)
        .with_graceful_shutdown(shutdown)
        .await
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::default())
        .expect("Response build failed")
}

/// Targets requested with `?target=`, which may repeat and hold comma
/// separated lists.
fn query_targets(query: Option<&str>) -> Vec<String> {
    let Some(query) = query else {
        return vec![];
    };

    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == "target")
        .flat_map(|(_, value)| split_hosts(&value))
        .collect()
}

fn should_compress(headers: &HeaderMap) -> bool {
    match headers.get(header::ACCEPT_ENCODING) {
        Some(value) => match value.to_str() {
            Ok(value) => accepts_gzip(value),
            Err(_err) => false,
        },
        None => false,
    }
}

/// Whether an `Accept-Encoding` value lists gzip with a non zero quality,
/// e.g. `gzip;q=0` refuses it.
fn accepts_gzip(value: &str) -> bool {
    value.split(',').any(|coding| {
        let mut parts = coding.split(';').map(str::trim);
        let name = parts.next().unwrap_or_default();
        if !name.eq_ignore_ascii_case("gzip") {
            return false;
        }

        let quality = parts
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("q"))
            .map_or(Some(1.0), |(_, q)| q.trim().parse::<f32>().ok());

        matches!(quality, Some(q) if q > 0.0)
    })
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::time::Duration;

    use flate2::read::GzDecoder;
    use framework::tls::Connector;
    use http_body_util::BodyExt;
    use testify::{CannedServer, next_addr};

    use super::*;
    use crate::zookeeper::Prober;

    fn exporter(targets: Vec<String>) -> Exporter {
        let prober = Prober::new(Connector::new(None).unwrap(), Duration::from_secs(5));
        Exporter::new(Collector::new(prober, 4), targets, "/metrics".to_string())
    }

    async fn body(resp: Response<Full<Bytes>>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    fn get(uri: &str) -> Request<()> {
        Request::get(uri).body(()).unwrap()
    }

    #[test]
    fn targets_from_query() {
        assert!(query_targets(None).is_empty());
        assert!(query_targets(Some("foo=bar")).is_empty());
        assert_eq!(
            query_targets(Some("target=zk1%3A2181,zk2:2181&target=zk3:2181&foo=bar")),
            vec!["zk1:2181", "zk2:2181", "zk3:2181"]
        );
    }

    #[test]
    fn compress_detection() {
        let mut headers = HeaderMap::new();
        assert!(!should_compress(&headers));

        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static("deflate, gzip;q=1.0"),
        );
        assert!(should_compress(&headers));

        headers.insert(
            header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip;q=0"),
        );
        assert!(!should_compress(&headers));
    }

    #[test]
    fn gzip_quality() {
        for (value, want) in [
            ("gzip", true),
            ("GZIP", true),
            ("br, gzip", true),
            ("gzip;q=0.5", true),
            ("gzip; q=0.001", true),
            ("gzip;q=0", false),
            ("gzip;q=0.0", false),
            ("gzip; Q=0.000", false),
            ("gzip;q=bogus", false),
            ("x-gzip2", false),
            ("deflate, br", false),
            ("identity", false),
            ("", false),
        ] {
            assert_eq!(accepts_gzip(value), want, "{value}");
        }
    }

    #[tokio::test]
    async fn gzip_refused() {
        let refused = next_addr().to_string();
        let req = Request::get("/metrics")
            .header(header::ACCEPT_ENCODING, "gzip;q=0, identity")
            .body(())
            .unwrap();

        let resp = exporter(vec![refused.clone()]).handle(req).await;
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
        assert_eq!(
            body(resp).await,
            Bytes::from(format!("zk_up{{zk_host=\"{refused}\"}} 0\n"))
        );
    }

    #[tokio::test]
    async fn unknown_path() {
        let resp = exporter(vec![]).handle(get("/")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = exporter(vec![]).handle(get("/metrics/foo")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn method_not_allowed() {
        let req = Request::post("/metrics").body(()).unwrap();
        let resp = exporter(vec![]).handle(req).await;

        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers().get(header::ALLOW).unwrap(), "GET");
    }

    #[tokio::test]
    async fn scrape() {
        let server = CannedServer::builder()
            .reply("mntr", "zk_avg_latency\t0\nzk_server_state\tstandalone\n")
            .reply("ruok", "imok")
            .start()
            .await;
        let host = server.addr().to_string();

        let resp = exporter(vec![host.clone()]).handle(get("/metrics")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            CONTENT_TYPE
        );
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());

        let body = body(resp).await;
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            format!(
                "zk_avg_latency{{zk_host=\"{host}\"}} 0\n\
                 zk_ruok{{zk_host=\"{host}\"}} 1\n\
                 zk_server_leader{{zk_host=\"{host}\"}} 0\n\
                 zk_up{{zk_host=\"{host}\"}} 1\n"
            )
        );
    }

    #[tokio::test]
    async fn scrape_gzip() {
        let refused = next_addr().to_string();
        let req = Request::get("/metrics")
            .header(header::ACCEPT_ENCODING, "gzip")
            .body(())
            .unwrap();

        let resp = exporter(vec![refused.clone()]).handle(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_ENCODING).unwrap(), "gzip");

        let compressed = body(resp).await;
        let mut text = String::new();
        GzDecoder::new(compressed.as_ref())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, format!("zk_up{{zk_host=\"{refused}\"}} 0\n"));
    }

    #[tokio::test]
    async fn query_overrides_targets() {
        let server = CannedServer::builder()
            .reply("mntr", "zk_znode_count\t7\n")
            .reply("ruok", "imok")
            .start()
            .await;
        let host = server.addr().to_string();
        let configured = next_addr().to_string();

        let resp = exporter(vec![configured.clone()])
            .handle(get(&format!("/metrics?target={host}")))
            .await;
        let text = String::from_utf8(body(resp).await.to_vec()).unwrap();

        assert!(text.contains(&format!("zk_znode_count{{zk_host=\"{host}\"}} 7\n")));
        assert!(!text.contains(&configured), "{text}");
    }
}
