use crate::assets::{load_model, AssetError, EnvironmentMap, LoadedModel, ModelSource};
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// The main lamp asset.
    Model,
    /// An extra model added from the editor toolbar.
    Import,
    Environment,
}

impl LoadKind {
    fn label(self) -> &'static str {
        match self {
            LoadKind::Model => "model",
            LoadKind::Import => "import",
            LoadKind::Environment => "environment",
        }
    }
}

pub enum LoadPayload {
    Model(LoadedModel),
    Environment(EnvironmentMap),
}

pub struct LoadResult {
    pub id: u64,
    pub kind: LoadKind,
    pub source: ModelSource,
    pub result: Result<LoadPayload, AssetError>,
}

/// Counts requests against completions. A failed load completes only its own
/// request and is remembered for the status line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingProgress {
    requested: usize,
    completed: usize,
    failed: usize,
    last_error: Option<String>,
}

impl LoadingProgress {
    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.requested
    }

    pub fn percent(&self) -> f32 {
        if self.requested == 0 {
            100.0
        } else {
            (self.completed.min(self.requested) as f32 / self.requested as f32) * 100.0
        }
    }

    fn fail(&mut self, message: String) {
        self.completed += 1;
        self.failed += 1;
        self.last_error = Some(message);
    }
}

/// Loads assets on worker threads and hands results back over a channel
/// polled once per frame. Results arrive in completion order.
pub struct AssetLoader {
    sender: Sender<LoadResult>,
    receiver: Receiver<LoadResult>,
    next_id: u64,
    outstanding: HashSet<u64>,
    progress: LoadingProgress,
}

impl AssetLoader {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            next_id: 1,
            outstanding: HashSet::new(),
            progress: LoadingProgress::default(),
        }
    }

    pub fn progress(&self) -> &LoadingProgress {
        &self.progress
    }

    /// True once every request has delivered a result, success or not.
    pub fn is_idle(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn request(&mut self, kind: LoadKind, source: ModelSource) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.progress.requested += 1;
        self.outstanding.insert(id);
        log::info!("Loading {} {} (#{})", kind.label(), source.describe(), id);

        let sender = self.sender.clone();
        let thread_source = source.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("lampviz-load-{}", id))
            .spawn(move || {
                let result = match kind {
                    LoadKind::Model | LoadKind::Import => {
                        load_model(&thread_source).map(LoadPayload::Model)
                    }
                    LoadKind::Environment => {
                        EnvironmentMap::load(&thread_source).map(LoadPayload::Environment)
                    }
                };
                let result = LoadResult {
                    id,
                    kind,
                    source: thread_source,
                    result,
                };
                if let Err(mpsc::SendError(lost)) = sender.send(result) {
                    log::error!(
                        "Loader closed before {} {} (#{}) was delivered",
                        lost.kind.label(),
                        lost.source.describe(),
                        lost.id
                    );
                }
            });
        if let Err(err) = spawned {
            log::error!("Failed to spawn loader thread for {}: {}", source.describe(), err);
            self.outstanding.remove(&id);
            self.progress.fail(format!("{}: {}", source.describe(), err));
        }
        id
    }

    /// Drain finished loads. Failures are logged here and recorded in the
    /// progress.
    pub fn poll(&mut self) -> Vec<LoadResult> {
        let mut finished = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(result) => {
                    if !self.outstanding.remove(&result.id) {
                        log::warn!("Dropping result for unknown load #{}", result.id);
                        continue;
                    }
                    match &result.result {
                        Err(err) => {
                            log::error!(
                                "Failed to load {} {}: {}",
                                result.kind.label(),
                                result.source.describe(),
                                err
                            );
                            self.progress
                                .fail(format!("{}: {}", result.source.describe(), err));
                        }
                        Ok(_) => {
                            self.progress.completed += 1;
                            log::debug!("Loaded #{} ({:.0}%)", result.id, self.progress.percent());
                        }
                    }
                    finished.push(result);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        finished
    }
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod http_fixture {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Duration;

    /// Serve `body` once, after `delay`, on an ephemeral port.
    pub fn serve_once(body: Vec<u8>, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            std::thread::sleep(delay);
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: model/gltf-binary\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&body);
        });
        format!("http://{}/models/lamp.glb", address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::http_fixture::serve_once;
    use crate::assets::model::fixtures::lamp_glb;
    use std::time::{Duration, Instant};

    fn drain(loader: &mut AssetLoader, expected: usize) -> Vec<LoadResult> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut results = Vec::new();
        while results.len() < expected && Instant::now() < deadline {
            results.extend(loader.poll());
            std::thread::sleep(Duration::from_millis(5));
        }
        results
    }

    #[test]
    fn loads_model_from_disk() {
        let path = std::env::temp_dir().join(format!("lampviz-loader-{}.glb", std::process::id()));
        std::fs::write(&path, lamp_glb()).unwrap();

        let mut loader = AssetLoader::new();
        let id = loader.request(LoadKind::Model, ModelSource::Path(path.clone()));
        assert!(!loader.is_idle());
        let results = drain(&mut loader, 1);
        std::fs::remove_file(&path).ok();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert!(matches!(results[0].result, Ok(LoadPayload::Model(_))));
        assert!(loader.is_idle());
        assert_eq!(loader.progress().percent(), 100.0);
    }

    #[test]
    fn failed_load_finishes_only_its_own_request() {
        let url = serve_once(lamp_glb(), Duration::from_millis(400));
        let mut loader = AssetLoader::new();
        let model = loader.request(LoadKind::Model, ModelSource::parse(&url));
        let environment = loader.request(
            LoadKind::Environment,
            ModelSource::parse("/nonexistent/lampviz/studio.hdr"),
        );

        let first = drain(&mut loader, 1);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, environment);
        assert!(matches!(first[0].result, Err(AssetError::Read { .. })));
        assert!(!loader.is_idle(), "slow model load must still be outstanding");
        assert_eq!(loader.outstanding(), 1);
        assert_eq!(loader.progress().failed(), 1);
        assert!(loader.progress().last_error().unwrap().contains("studio.hdr"));

        let second = drain(&mut loader, 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, model);
        assert!(matches!(second[0].result, Ok(LoadPayload::Model(_))));
        assert!(loader.is_idle());
        assert_eq!(loader.progress().percent(), 100.0);
    }

    #[test]
    fn progress_counts_requests() {
        let mut progress = LoadingProgress::default();
        assert!(progress.is_complete());
        progress.requested = 4;
        progress.completed = 1;
        assert_eq!(progress.percent(), 25.0);
        progress.fail("lamp.glb: not found".to_string());
        assert_eq!(progress.completed(), 2);
        assert_eq!(progress.failed(), 1);
        assert!(!progress.is_complete());
    }
}
