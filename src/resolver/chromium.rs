//! Chrome DevTools automation engine
//!
//! Implements the automation traits on top of `chromiumoxide`. Resource
//! blocking uses the Fetch domain with one request pattern per blocked type,
//! so every paused request is one to fail. Responses are forwarded from the
//! Network domain's `responseReceived` events onto the page's channel.

use super::automation::{
    AutomationEngine, AutomationLauncher, AutomationPage, BrowserCookie, ObservedResponse,
    ResourceType, ResponseEvents,
};
use crate::{Error, Result, config::BrowserSettings};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    cdp::{
        browser_protocol::{
            fetch::{EnableParams, EventRequestPaused, FailRequestParams, RequestPattern},
            network::{
                self, ErrorReason, EventResponseReceived, GetResponseBodyParams, RequestId,
            },
            page::{EventDomContentEventFired, NavigateParams},
            storage::GetCookiesParams,
        },
        js_protocol::runtime::EvaluateParams,
    },
    error::CdpError,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

const IFRAME_SOURCES_JS: &str = "Array.from(document.querySelectorAll('iframe')).map(f => f.src).filter(s => typeof s === 'string' && s.length > 0)";

fn cdp_error(stage: &str) -> impl FnOnce(CdpError) -> Error + '_ {
    move |e| Error::automation(stage.to_string(), e.to_string())
}

fn cdp_resource_type(kind: ResourceType) -> network::ResourceType {
    match kind {
        ResourceType::Document => network::ResourceType::Document,
        ResourceType::Script => network::ResourceType::Script,
        ResourceType::Xhr => network::ResourceType::Xhr,
        ResourceType::Fetch => network::ResourceType::Fetch,
        ResourceType::Image => network::ResourceType::Image,
        ResourceType::Font => network::ResourceType::Font,
        ResourceType::Stylesheet => network::ResourceType::Stylesheet,
        ResourceType::Media => network::ResourceType::Media,
        ResourceType::Other => network::ResourceType::Other,
    }
}

/// JS that fetches `url` with the page's credentials and returns base64
fn fetch_script(url: &str) -> Result<String> {
    let quoted = serde_json::to_string(url)?;
    Ok(format!(
        r#"(async () => {{
  const r = await fetch({quoted}, {{ credentials: 'include' }});
  if (!r.ok) throw new Error('status ' + r.status);
  const b = new Uint8Array(await r.arrayBuffer());
  let s = '';
  for (let i = 0; i < b.length; i += 0x8000) {{
    s += String.fromCharCode.apply(null, b.subarray(i, i + 0x8000));
  }}
  return btoa(s);
}})()"#
    ))
}

/// Launches a headless Chrome per resolution
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: &BrowserSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }
}

#[async_trait]
impl AutomationLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn AutomationEngine>> {
        let mut builder = BrowserConfig::builder().args(self.settings.args.clone());
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder
            .build()
            .map_err(|e| Error::automation("launch".to_string(), e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(cdp_error("launch"))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("DevTools handler stopped: {}", e);
                    break;
                }
            }
        });

        tracing::info!("Chrome launched");
        Ok(Arc::new(ChromiumEngine {
            browser: Mutex::new(browser),
            handler_task,
        }))
    }
}

/// A running Chrome instance
pub struct ChromiumEngine {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl AutomationEngine for ChromiumEngine {
    async fn new_page(&self) -> Result<Arc<dyn AutomationPage>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(cdp_error("new_page"))?;
        Ok(Arc::new(ChromiumPage {
            page,
            tasks: StdMutex::new(Vec::new()),
        }))
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        let response = self
            .browser
            .lock()
            .await
            .execute(GetCookiesParams::default())
            .await
            .map_err(cdp_error("cookies"))?;
        Ok(response
            .result
            .cookies
            .into_iter()
            .map(|c| BrowserCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let result = browser.close().await.map(|_| ());
        let _ = browser.wait().await;
        self.handler_task.abort();
        result.map_err(cdp_error("close"))
    }
}

/// One Chrome tab
pub struct ChromiumPage {
    page: Page,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl ChromiumPage {
    fn track(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }
}

#[async_trait]
impl AutomationPage for ChromiumPage {
    async fn block_resource_types(&self, types: &[ResourceType]) -> Result<()> {
        if types.is_empty() {
            return Ok(());
        }

        let patterns: Vec<RequestPattern> = types
            .iter()
            .map(|kind| {
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(cdp_resource_type(*kind))
                    .build()
            })
            .collect();

        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(cdp_error("block_resources"))?;
        self.page
            .execute(EnableParams::builder().patterns(patterns).build())
            .await
            .map_err(cdp_error("block_resources"))?;

        let page = self.page.clone();
        self.track(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let fail = FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
                if page.execute(fail).await.is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn observe_responses(&self) -> Result<ResponseEvents> {
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(cdp_error("observe"))?;
        let (tx, rx) = mpsc::unbounded_channel();

        self.track(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                let headers = event
                    .response
                    .headers
                    .inner()
                    .as_object()
                    .map(|map| {
                        map.iter()
                            .filter_map(|(k, v)| {
                                v.as_str().map(|v| (k.to_ascii_lowercase(), v.to_string()))
                            })
                            .collect::<HashMap<_, _>>()
                    })
                    .unwrap_or_default();
                let observed = ObservedResponse {
                    request_id: event.request_id.inner().clone(),
                    url: event.response.url.clone(),
                    status: u16::try_from(event.response.status).unwrap_or(0),
                    headers,
                };
                if tx.send(observed).is_err() {
                    break;
                }
            }
        }));
        Ok(rx)
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(cdp_error("navigate"))?;

        let response = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .map_err(cdp_error("navigate"))?;
        if let Some(error_text) = &response.result.error_text {
            return Err(Error::automation("navigate".to_string(), error_text.clone()));
        }

        dom_ready.next().await;
        Ok(())
    }

    async fn iframe_sources(&self) -> Result<Vec<String>> {
        self.page
            .evaluate(IFRAME_SOURCES_JS)
            .await
            .map_err(cdp_error("iframes"))?
            .into_value::<Vec<String>>()
            .map_err(Error::from)
    }

    async fn response_body(&self, request_id: &str) -> Result<String> {
        let response = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
            .await
            .map_err(cdp_error("response_body"))?;
        let body = response.result.body.clone();
        if response.result.base64_encoded {
            let bytes = STANDARD.decode(body).map_err(|e| {
                Error::automation("response_body".to_string(), e.to_string())
            })?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Ok(body)
        }
    }

    async fn evaluate_fetch(&self, url: &str) -> Result<Vec<u8>> {
        let params = EvaluateParams::builder()
            .expression(fetch_script(url)?)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| Error::automation("context_fetch".to_string(), e))?;

        let encoded: String = self
            .page
            .evaluate(params)
            .await
            .map_err(cdp_error("context_fetch"))?
            .into_value()?;

        STANDARD
            .decode(encoded)
            .map_err(|e| Error::automation("context_fetch".to_string(), e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.page.clone().close().await.map_err(cdp_error("close_page"))
    }
}
