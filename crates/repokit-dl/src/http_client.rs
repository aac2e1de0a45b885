use std::{collections::HashMap, sync::Mutex, time::Duration};

use ureq::{http::HeaderMap, typestate::WithoutBody, Agent, Proxy, RequestBuilder};

use crate::error::{DownloadError, Result};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub headers: Option<HeaderMap>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: Some(concat!("repokit/", env!("CARGO_PKG_VERSION")).into()),
            headers: None,
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Builds an HTTP `Agent` for the given proxy.
    pub fn build(&self, proxy: Option<&str>) -> Result<Agent> {
        let proxy = proxy
            .map(|p| {
                Proxy::new(p).map_err(|err| {
                    DownloadError::InvalidProxy {
                        proxy: p.to_string(),
                        source: Box::new(err),
                    }
                })
            })
            .transpose()?;

        let mut config = Agent::config_builder()
            .proxy(proxy)
            .timeout_global(self.timeout);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        Ok(config.build().into())
    }
}

/// HTTP client holding one agent per distinct proxy.
pub struct HttpClient {
    config: ClientConfig,
    agents: Mutex<HashMap<Option<String>, Agent>>,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            agents: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn agent(&self, proxy: Option<&str>) -> Result<Agent> {
        let mut agents = self.agents.lock().unwrap_or_else(|e| e.into_inner());
        let key = proxy.map(String::from);
        if let Some(agent) = agents.get(&key) {
            return Ok(agent.clone());
        }
        let agent = self.config.build(proxy)?;
        agents.insert(key, agent.clone());
        Ok(agent)
    }

    /// GET request that bypasses intermediate caches.
    pub fn get(&self, url: &str, proxy: Option<&str>) -> Result<RequestBuilder<WithoutBody>> {
        let mut req = self.agent(proxy)?.get(url).header("Pragma", "no-cache");
        if let Some(headers) = &self.config.headers {
            for (key, value) in headers.iter() {
                req = req.header(key, value);
            }
        }
        Ok(req)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
