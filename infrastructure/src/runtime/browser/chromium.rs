//! Headless Chromium host
//!
//! One shared browser instance serves every sandbox run; pages are
//! independent and may run concurrently. The browser is driven entirely over
//! its DevTools HTTP endpoints — `/json/new` to open a page at a URL,
//! `/json/close/{id}` to discard it — so no protocol client beyond plain
//! HTTP is needed. The child announces its DevTools port on stderr and is
//! killed when the host drops.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use toolgate_application::RuntimeError;
use tracing::{debug, info, trace, warn};

/// Timeout for the browser to announce its DevTools port.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for DevTools endpoint round trips.
const DEVTOOLS_TIMEOUT: Duration = Duration::from_secs(10);

/// A surface that can open and discard pages at a URL.
///
/// Seam between the browser runtime and the actual browser, so tests can
/// simulate navigation failures and callback behavior without a binary.
#[async_trait]
pub trait PageHost: Send + Sync {
    /// Navigate a fresh page to `url`, returning an opaque page id.
    async fn open_page(&self, url: &str) -> Result<String, RuntimeError>;

    /// Discard a page. Best-effort; a page that already died is fine.
    async fn close_page(&self, page_id: &str);
}

/// Wire shape of a `/json/new` response.
#[derive(Debug, Deserialize)]
struct NewTargetResponse {
    id: String,
}

/// A running headless Chromium child plus its DevTools endpoint.
pub struct ChromiumHost {
    child: Child,
    devtools_port: u16,
    http: reqwest::Client,
}

impl ChromiumHost {
    /// Spawn the browser and wait for it to announce its DevTools port.
    pub async fn launch(binary: &str) -> Result<Self, RuntimeError> {
        debug!("Chromium: spawning {} (headless)", binary);
        let profile_dir = std::env::temp_dir().join(format!(
            "toolgate-chromium-{}",
            std::process::id()
        ));

        let mut cmd = Command::new(binary);
        cmd.arg("--headless=new")
            .arg("--remote-debugging-port=0")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-gpu")
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Linux: request kernel to send SIGTERM to the browser when the host
        // dies. Catches cases where Drop doesn't run (SIGKILL, OOM kill).
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;
        let stderr = child.stderr.take().ok_or_else(|| {
            RuntimeError::HostUnavailable("failed to capture browser stderr".to_string())
        })?;

        let mut reader = BufReader::new(stderr);
        let port = tokio::time::timeout(STARTUP_TIMEOUT, async {
            let mut line = String::new();
            loop {
                line.clear();
                let bytes_read = reader.read_line(&mut line).await.map_err(|e| {
                    RuntimeError::HostUnavailable(format!("browser stderr closed: {}", e))
                })?;
                if bytes_read == 0 {
                    return Err(RuntimeError::HostUnavailable(
                        "browser exited without announcing its DevTools port".to_string(),
                    ));
                }

                let trimmed = line.trim();
                trace!("Chromium output: {}", trimmed);
                if let Some(rest) = trimmed.strip_prefix("DevTools listening on ws://127.0.0.1:")
                    && let Some(port_str) = rest.split('/').next()
                    && let Ok(port) = port_str.parse::<u16>()
                {
                    return Ok(port);
                }
            }
        })
        .await
        .map_err(|_| {
            RuntimeError::HostUnavailable(format!(
                "browser did not announce its DevTools port within {:?}",
                STARTUP_TIMEOUT
            ))
        })??;

        // Keep draining stderr so the browser never blocks on a full pipe
        tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => trace!("Chromium output: {}", line.trim()),
                }
            }
        });

        info!("Chromium: DevTools listening on port {}", port);
        Ok(Self {
            child,
            devtools_port: port,
            http: reqwest::Client::builder()
                .timeout(DEVTOOLS_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.devtools_port, path)
    }
}

#[async_trait]
impl PageHost for ChromiumHost {
    async fn open_page(&self, url: &str) -> Result<String, RuntimeError> {
        // DevTools takes the target URL as the raw query string
        let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
        let response = self
            .http
            .put(self.endpoint(&format!("/json/new?{}", encoded)))
            .send()
            .await
            .map_err(|e| RuntimeError::Navigation(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RuntimeError::Navigation(format!(
                "DevTools /json/new returned {}",
                status
            )));
        }
        let target: NewTargetResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::Navigation(e.to_string()))?;
        debug!("Chromium: opened page {} at {}", target.id, url);
        Ok(target.id)
    }

    async fn close_page(&self, page_id: &str) {
        let result = self
            .http
            .get(self.endpoint(&format!("/json/close/{}", page_id)))
            .send()
            .await;
        if let Err(e) = result {
            warn!("Chromium: failed to close page {}: {}", page_id, e);
        } else {
            debug!("Chromium: closed page {}", page_id);
        }
    }
}

impl Drop for ChromiumHost {
    fn drop(&mut self) {
        debug!("ChromiumHost dropping, killing browser child process");
        let _ = self.child.start_kill();
    }
}

/// Lazily started, process-wide shared browser.
///
/// Startup is guarded by a single-initialization lock: the first caller
/// pays the launch cost while every concurrent caller waits on the same
/// in-flight initialization, then they all share the one instance.
pub struct SharedChromium {
    binary: String,
    host: Mutex<Option<Arc<ChromiumHost>>>,
}

impl SharedChromium {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            host: Mutex::new(None),
        }
    }

    async fn get_or_launch(&self) -> Result<Arc<ChromiumHost>, RuntimeError> {
        let mut guard = self.host.lock().await;
        if let Some(host) = guard.as_ref() {
            return Ok(Arc::clone(host));
        }
        let host = Arc::new(ChromiumHost::launch(&self.binary).await?);
        *guard = Some(Arc::clone(&host));
        Ok(host)
    }
}

#[async_trait]
impl PageHost for SharedChromium {
    async fn open_page(&self, url: &str) -> Result<String, RuntimeError> {
        let host = self.get_or_launch().await?;
        host.open_page(url).await
    }

    async fn close_page(&self, page_id: &str) {
        let host = {
            let guard = self.host.lock().await;
            guard.as_ref().map(Arc::clone)
        };
        if let Some(host) = host {
            host.close_page(page_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_launch_fails_cleanly_for_missing_binary() {
        let result = ChromiumHost::launch("definitely-not-a-browser-binary").await;
        assert!(matches!(result, Err(RuntimeError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_shared_host_propagates_launch_failure() {
        let shared = SharedChromium::new("definitely-not-a-browser-binary");
        let result = shared.open_page("http://127.0.0.1:1/never").await;
        assert!(result.is_err());
    }
}
