//! [`BrowserContext`] over the W3C WebDriver HTTP protocol (chromedriver and
//! friends). One WebDriver session is shared by every tab.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::{BoundingBox, BrowserContext, MapPage};
use crate::config::{Config, Timings};
use crate::error::BrowserError;
use crate::session::google_map_url;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const CONSENT_BUTTONS: [&str; 3] = ["Accept all", "I agree", "Accept"];

struct Session {
    client: reqwest::Client,
    base: String,
    id: String,
    // The protocol has a single "current window" per session.
    focus: Mutex<Option<String>>,
}

impl Session {
    async fn raw(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let url = format!("{}/session/{}{}", self.base, self.id, path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        debug!("webdriver {} {}", method, path);
        let response = request.send().await?;
        let ok = response.status().is_success();
        let body: Value = response.json().await?;
        unwrap_value(ok, body)
    }

    /// Runs one command against `handle`, switching windows first if needed.
    async fn command(&self, handle: &str, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let mut focus = self.focus.lock().await;
        if focus.as_deref() != Some(handle) {
            self.raw(Method::POST, "/window", Some(json!({ "handle": handle }))).await?;
            *focus = Some(handle.to_string());
        }
        self.raw(method, path, body).await
    }
}

fn unwrap_value(ok: bool, mut body: Value) -> Result<Value, BrowserError> {
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if ok {
        return Ok(value);
    }
    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string();
    let message = value.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
    if error == "no such element" {
        return Err(BrowserError::NotFound(message));
    }
    Err(BrowserError::Protocol { error, message })
}

fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        let parts = text.split('\'').map(|p| format!("'{p}'")).collect::<Vec<_>>();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn role_xpath(role: &str, name: &str) -> String {
    let (role, name) = (xpath_literal(role), xpath_literal(name));
    format!("//*[(@role={role} or local-name()={role}) and (@aria-label={name} or normalize-space(.)={name})]")
}

fn element_id(value: &Value) -> Result<String, BrowserError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Malformed(format!("no element reference in {value}")))
}

fn capabilities(config: &Config) -> Value {
    let mut args = vec![
        "--no-sandbox".to_string(),
        format!("--window-size={},{}", config.viewport_width, config.viewport_height),
        format!("--lang={}", config.locale),
        format!("--user-agent={}", config.user_agent),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    if let Some(proxy) = &config.proxy {
        args.push(format!("--proxy-server={}", proxy.server));
        if let Some(bypass) = &proxy.bypass {
            args.push(format!("--proxy-bypass-list={bypass}"));
        }
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "pageLoadStrategy": "eager",
                "goog:chromeOptions": {
                    "args": args,
                    "prefs": { "intl.accept_languages": config.locale },
                },
            }
        }
    })
}

fn pointer_actions(steps: Vec<Value>) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "mouse",
            "parameters": { "pointerType": "mouse" },
            "actions": steps,
        }]
    })
}

fn move_step(x: f64, y: f64) -> Value {
    json!({ "type": "pointerMove", "origin": "viewport", "duration": 0, "x": x.round() as i64, "y": y.round() as i64 })
}

pub struct WebDriverContext {
    session: Arc<Session>,
    home: String,
    viewport: (u32, u32),
}

impl WebDriverContext {
    /// Starts the shared session and clears the consent prompt once.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        let base = config.webdriver_url.trim_end_matches('/').to_string();

        if config.proxy.as_ref().is_some_and(|p| p.username.is_some()) {
            warn!("proxy credentials are not supported by the webdriver backend and will be ignored");
        }

        let response = client
            .post(format!("{base}/session"))
            .json(&capabilities(config))
            .send()
            .await?;
        let ok = response.status().is_success();
        let value = unwrap_value(ok, response.json().await?)?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("webdriver did not return a session id"))?
            .to_string();
        info!("webdriver session {} started at {}", id, base);

        let session = Arc::new(Session {
            client,
            base,
            id,
            focus: Mutex::new(None),
        });

        let timeouts = json!({
            "pageLoad": config.navigation_timeout().as_millis() as u64,
            "script": 30_000,
            "implicit": 0,
        });
        session.raw(Method::POST, "/timeouts", Some(timeouts)).await?;

        let home = session
            .raw(Method::GET, "/window", None)
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("webdriver did not return a window handle"))?;
        *session.focus.lock().await = Some(home.clone());

        let context = Self {
            session,
            home,
            viewport: (config.viewport_width, config.viewport_height),
        };
        context.accept_consent(&config.timings).await;
        Ok(context)
    }

    async fn accept_consent(&self, timings: &Timings) {
        let mut page = match self.open_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!("could not open consent page: {}", e);
                return;
            }
        };

        let mut accepted = false;
        if page.navigate(&google_map_url(0.0, 0.0, 0)).await.is_ok() {
            for label in CONSENT_BUTTONS {
                if page.click_by_role("button", label).await.is_ok() {
                    tokio::time::sleep(timings.consent()).await;
                    accepted = true;
                    break;
                }
            }
        }
        if accepted {
            info!("cookie banner accepted");
        } else {
            info!("no cookie banner found");
        }

        if let Err(e) = page.close().await {
            warn!("failed to close consent page: {}", e);
        }
    }
}

impl BrowserContext for WebDriverContext {
    type Page = WebDriverPage;

    async fn open_page(&self) -> Result<WebDriverPage, BrowserError> {
        let value = self
            .session
            .command(&self.home, Method::POST, "/window/new", Some(json!({ "type": "tab" })))
            .await?;
        let handle = value
            .get("handle")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Malformed(format!("no window handle in {value}")))?
            .to_string();
        debug!("opened tab {}", handle);
        Ok(WebDriverPage {
            session: self.session.clone(),
            handle,
            pointer: (0.0, 0.0),
            closed: false,
        })
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    async fn dispose(&self) -> Result<(), BrowserError> {
        let url = format!("{}/session/{}", self.session.base, self.session.id);
        let response = self.session.client.delete(url).send().await?;
        let ok = response.status().is_success();
        unwrap_value(ok, response.json().await?)?;
        info!("webdriver session {} closed", self.session.id);
        Ok(())
    }
}

pub struct WebDriverPage {
    session: Arc<Session>,
    handle: String,
    pointer: (f64, f64),
    closed: bool,
}

impl WebDriverPage {
    async fn run(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        self.session.command(&self.handle, method, path, body).await
    }

    async fn find(&self, using: &str, selector: &str) -> Result<String, BrowserError> {
        let value = self
            .run(Method::POST, "/element", Some(json!({ "using": using, "value": selector })))
            .await?;
        element_id(&value)
    }

    async fn perform(&self, actions: Value) -> Result<(), BrowserError> {
        self.run(Method::POST, "/actions", Some(actions)).await?;
        Ok(())
    }
}

impl MapPage for WebDriverPage {
    // pageLoadStrategy "eager" makes this return at DOMContentLoaded.
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.run(Method::POST, "/url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn evaluate_script(&mut self, script: &str) -> Result<Value, BrowserError> {
        self.run(Method::POST, "/execute/sync", Some(json!({ "script": script, "args": [] })))
            .await
    }

    async fn click_by_role(&mut self, role: &str, name: &str) -> Result<(), BrowserError> {
        let id = self.find("xpath", &role_xpath(role, name)).await?;
        self.run(Method::POST, &format!("/element/{id}/click"), Some(json!({}))).await?;
        Ok(())
    }

    async fn click_at(&mut self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.pointer = (x, y);
        let steps = vec![
            move_step(x, y),
            json!({ "type": "pointerDown", "button": 0 }),
            json!({ "type": "pointerUp", "button": 0 }),
        ];
        self.perform(pointer_actions(steps)).await
    }

    async fn move_mouse(&mut self, x: f64, y: f64) -> Result<(), BrowserError> {
        self.pointer = (x, y);
        self.perform(pointer_actions(vec![move_step(x, y)])).await
    }

    async fn wheel(&mut self, delta_y: f64) -> Result<(), BrowserError> {
        let (x, y) = self.pointer;
        let actions = json!({
            "actions": [{
                "type": "wheel",
                "id": "wheel",
                "actions": [{
                    "type": "scroll",
                    "origin": "viewport",
                    "x": x.round() as i64,
                    "y": y.round() as i64,
                    "deltaX": 0,
                    "deltaY": delta_y.round() as i64,
                }],
            }]
        });
        self.perform(actions).await
    }

    async fn bounding_box(&mut self, selector: &str) -> Result<Option<BoundingBox>, BrowserError> {
        let id = match self.find("css selector", selector).await {
            Ok(id) => id,
            Err(BrowserError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let rect = self.run(Method::GET, &format!("/element/{id}/rect"), None).await?;
        let rect: BoundingBox = serde_json::from_value(rect)
            .map_err(|e| BrowserError::Malformed(format!("element rect: {e}")))?;
        Ok(Some(rect))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
        let value = self.run(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BrowserError::Malformed("screenshot is not a string".into()))?;
        Ok(STANDARD.decode(encoded)?)
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.run(Method::DELETE, "/window", None).await;
        *self.session.focus.lock().await = None;
        result.map(|_| ())
    }
}
