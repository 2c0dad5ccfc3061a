use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::signal::unix::Signal;

/// Control messages derived from OS signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTo {
    /// Signal to shutdown process gracefully
    Shutdown,
    /// Shutdown process immediately
    Quit,
}

pin_project! {
    pub struct Signals {
        #[pin]
        sigint: Signal,
        #[pin]
        sigterm: Signal,
        #[pin]
        sigquit: Signal,
    }
}

impl Stream for Signals {
    type Item = SignalTo;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if this.sigint.poll_recv(cx).is_ready() {
            info!(message = "Signal received", signal = "SIGINT");
            return Poll::Ready(Some(SignalTo::Shutdown));
        }

        if this.sigterm.poll_recv(cx).is_ready() {
            info!(message = "Signal received", signal = "SIGTERM");
            return Poll::Ready(Some(SignalTo::Shutdown));
        }

        if this.sigquit.poll_recv(cx).is_ready() {
            info!(message = "Signal received", signal = "SIGQUIT");
            return Poll::Ready(Some(SignalTo::Quit));
        }

        Poll::Pending
    }
}

/// Signals from OS/user
pub fn os_signals() -> std::io::Result<Signals> {
    use tokio::signal::unix::{SignalKind, signal};

    Ok(Signals {
        sigint: signal(SignalKind::interrupt())?,
        sigterm: signal(SignalKind::terminate())?,
        sigquit: signal(SignalKind::quit())?,
    })
}
