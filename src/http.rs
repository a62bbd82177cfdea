use crate::error::{FetchError, Verb};
use crate::transport::{Clock, Pending, Reply, Request, Transport};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

async fn perform(client: reqwest::Client, request: Request) -> Result<Vec<u8>, FetchError> {
    let mut builder = match request.verb {
        Verb::Get => client.get(request.url),
        Verb::Post => client.post(request.url),
    };
    if request.bypass_cache {
        builder = builder.header("Cache-Control", "no-cache");
    }
    for (name, value) in request.headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    Ok(bytes.to_vec())
}

impl Transport for HttpTransport {
    fn fetch(&self, request: Request, reply: Reply) -> Pending {
        let client = self.client.clone();
        let task = tokio::spawn(async move {
            let result = perform(client, request).await;
            reply.respond(result);
        });
        let abort = task.abort_handle();
        Pending::abortable(move || abort.abort())
    }
}

/// Timer facility backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn schedule(&self, delay: Duration, repeats: bool, reply: Reply) -> Pending {
        let task = tokio::spawn(async move {
            if repeats {
                // `interval` panics on a zero period.
                let period = delay.max(Duration::from_millis(1));
                let mut interval =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                loop {
                    interval.tick().await;
                    reply.tick();
                }
            } else {
                tokio::time::sleep(delay).await;
                reply.fire();
            }
        });
        let abort = task.abort_handle();
        Pending::abortable(move || abort.abort())
    }
}
