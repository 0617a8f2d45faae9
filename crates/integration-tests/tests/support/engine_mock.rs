#![allow(dead_code)]

/// In-process engine stand-in. Tests build a small axum router describing the
/// engine behavior they need and read back whatever state the handlers
/// captured.
pub struct MockEngineServer {
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl MockEngineServer {
    pub async fn start(app: axum::Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("mock engine listener should bind");
        let bind_addr = listener
            .local_addr()
            .expect("mock engine listener local address should exist");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("mock engine server should run");
        });

        Self {
            base_url: format!("http://{bind_addr}"),
            handle,
        }
    }
}

impl Drop for MockEngineServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
