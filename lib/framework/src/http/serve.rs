use std::net::SocketAddr;

use futures::future::BoxFuture;
use http::{Request, Response};
use hyper::body::{Body, Incoming};
use hyper::service::Service;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::Error;

/// Serve the service with the supplied listener.
pub fn serve<S>(listener: TcpListener, service: S) -> Serve<S> {
    Serve { listener, service }
}

pub struct Serve<S> {
    listener: TcpListener,
    service: S,
}

impl<S> Serve<S> {
    /// Prepares a server to handle graceful shutdown when the provided future
    /// completes.
    pub fn with_graceful_shutdown<F>(self, shutdown: F) -> WithGracefulShutdown<S, F>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        WithGracefulShutdown {
            listener: self.listener,
            service: self.service,
            shutdown,
        }
    }
}

/// Serve future with graceful shutdown enabled.
pub struct WithGracefulShutdown<S, F> {
    listener: TcpListener,
    service: S,
    shutdown: F,
}

impl<S, F, B> IntoFuture for WithGracefulShutdown<S, F>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Error>,
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Error>,
    F: Future<Output = ()> + Send + 'static,
{
    type Output = Result<(), Error>;
    type IntoFuture = BoxFuture<'static, Result<(), Error>>;

    fn into_future(self) -> Self::IntoFuture {
        let WithGracefulShutdown {
            listener,
            service,
            shutdown,
        } = self;

        Box::pin(async move {
            // every connection watches this, flipped once shutdown resolves
            let (closing_tx, closing_rx) = watch::channel(false);
            tokio::pin!(shutdown);

            loop {
                let (conn, peer) = tokio::select! {
                    _ = &mut shutdown => break,
                    result = listener.accept() => match result {
                        Ok((conn, peer)) => (TokioIo::new(conn), peer),
                        Err(err) => {
                            error!(
                                message = "accept new connection failed",
                                %err
                            );

                            continue;
                        }
                    }
                };

                let mut closing = closing_rx.clone();
                let service = ConnectInfo {
                    peer,
                    inner: service.clone(),
                };
                tokio::spawn(async move {
                    let builder = Builder::new(TokioExecutor::new());
                    let conn = builder.serve_connection(conn, service);
                    tokio::pin!(conn);

                    tokio::select! {
                        result = conn.as_mut() => {
                            if let Err(err) = result {
                                trace!(
                                    message = "failed to serve http connection",
                                    %peer,
                                    %err
                                );
                            }

                            return;
                        }
                        _ = closing.wait_for(|closing| *closing) => {}
                    }

                    conn.as_mut().graceful_shutdown();
                    if let Err(err) = conn.await {
                        trace!(
                            message = "failed to shutdown http connection",
                            %peer,
                            %err
                        );
                    }
                });
            }

            let _ = closing_tx.send(true);
            info!(message = "http server shutdown");

            Ok(())
        })
    }
}

#[derive(Clone)]
struct ConnectInfo<S> {
    peer: SocketAddr,
    inner: S,
}

impl<B, S> Service<Request<B>> for ConnectInfo<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn call(&self, mut req: Request<B>) -> Self::Future {
        req.extensions_mut().insert(self.peer);
        self.inner.call(req)
    }
}
