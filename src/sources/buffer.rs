use tokio::sync::RwLock;

/// Serialized lines of the most recent scrape. Readers only ever get copies.
#[derive(Debug, Default)]
pub struct PublishBuffer {
    lines: RwLock<Vec<u8>>,
}

impl PublishBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published snapshot.
    pub async fn publish(&self, lines: Vec<u8>) {
        let mut guard = self.lines.write().await;
        *guard = lines;
    }

    pub async fn snapshot(&self) -> Vec<u8> {
        self.lines.read().await.clone()
    }
}
