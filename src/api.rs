//! REST client for the Sistema Diesel API.
//!
//! Every call goes through [`ApiClient::send_json`], which adds the bearer
//! token, maps HTTP statuses onto [`DieselError`] and decodes the JSON body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::auth::Credential;
use crate::domain::DieselError;
use crate::preset::{Preset, PresetId, PresetService};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Value>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PageBody {
    Paginated {
        data: Vec<Value>,
        #[serde(default)]
        current_page: Option<u32>,
        #[serde(default)]
        last_page: Option<u32>,
        #[serde(default)]
        total: Option<u64>,
    },
    Bare(Vec<Value>),
}

impl From<PageBody> for Page {
    fn from(body: PageBody) -> Self {
        match body {
            PageBody::Paginated {
                data,
                current_page,
                last_page,
                total,
            } => {
                let current_page = current_page.unwrap_or(1).max(1);
                Page {
                    rows: data,
                    current_page,
                    total_pages: last_page.unwrap_or(current_page).max(current_page),
                    total,
                }
            }
            PageBody::Bare(rows) => Page {
                total: Some(rows.len() as u64),
                rows,
                current_page: 1,
                total_pages: 1,
            },
        }
    }
}

/// Server side ordering of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub key: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub page: u32,
    pub per_page: u32,
    pub search: Option<String>,
    pub sort: Option<Sort>,
}

impl PageQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
        ];
        if let Some(term) = self.search.as_deref().filter(|t| !t.trim().is_empty()) {
            params.push(("search", term.trim().to_string()));
        }
        if let Some(sort) = &self.sort {
            params.push(("sort_by", sort.key.clone()));
            let dir = if sort.ascending { "asc" } else { "desc" };
            params.push(("sort_dir", dir.to_string()));
        }
        params
    }
}

/// Listing of the tenant's entities.
#[async_trait]
pub trait EntityService: Send + Sync {
    async fn list(
        &self,
        resource: &str,
        query: &PageQuery,
        credential: &Credential,
    ) -> Result<Page, DieselError>;
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    company_slug: String,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        company_slug: &str,
        timeout: Duration,
    ) -> Result<Self, DieselError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            company_slug: company_slug.trim_matches('/').to_string(),
        })
    }

    fn preset_url(&self, id: Option<PresetId>) -> String {
        match id {
            Some(PresetId(id)) => format!("{}/column-presets/{id}", self.base_url),
            None => format!("{}/column-presets", self.base_url),
        }
    }

    fn resource_url(&self, resource: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.company_slug, resource)
    }

    /// Sends a request and decodes the answer. A `404` is reported as
    /// `Ok(None)` so callers can tell "absent" apart from failures.
    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<Value>,
        credential: &Credential,
    ) -> Result<Option<T>, DieselError> {
        debug!("{method} {url}");
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&credential.token)
            .header(ACCEPT, "application/json")
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        trace!("{url} answered {status}");
        match status {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED => return Err(DieselError::Unauthenticated),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(DieselError::Http {
                    status: s.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        let bytes = response.bytes().await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn write_preset(
        &self,
        method: Method,
        id: Option<PresetId>,
        preset: &Preset,
        credential: &Credential,
    ) -> Result<Preset, DieselError> {
        let url = self.preset_url(id);
        let body = serde_json::to_value(preset)?;
        self.send_json(method, &url, &[], Some(body), credential)
            .await?
            .ok_or(DieselError::Http {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: url,
            })
    }
}

#[async_trait]
impl PresetService for ApiClient {
    async fn fetch_preset(
        &self,
        user_id: i64,
        entity_name: &str,
        credential: &Credential,
    ) -> Result<Option<Preset>, DieselError> {
        let query = [
            ("user_id", user_id.to_string()),
            ("entity_name", entity_name.to_string()),
        ];
        let preset: Option<Option<Preset>> = self
            .send_json(Method::GET, &self.preset_url(None), &query, None, credential)
            .await?;
        Ok(preset.flatten())
    }

    async fn create_preset(
        &self,
        preset: &Preset,
        credential: &Credential,
    ) -> Result<Preset, DieselError> {
        self.write_preset(Method::POST, None, preset, credential)
            .await
    }

    async fn update_preset(
        &self,
        id: PresetId,
        preset: &Preset,
        credential: &Credential,
    ) -> Result<Preset, DieselError> {
        self.write_preset(Method::PUT, Some(id), preset, credential)
            .await
    }
}

#[async_trait]
impl EntityService for ApiClient {
    async fn list(
        &self,
        resource: &str,
        query: &PageQuery,
        credential: &Credential,
    ) -> Result<Page, DieselError> {
        let url = self.resource_url(resource);
        let body: Option<PageBody> = self
            .send_json(Method::GET, &url, &query.params(), None, credential)
            .await?;
        body.map(Page::from).ok_or(DieselError::Http {
            status: StatusCode::NOT_FOUND.as_u16(),
            body: url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCredentials;
    use crate::preset::{PresetManager, PresetState};
    use crate::testing::keys;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Answers one connection per canned `(status, body)` pair, in order.
    async fn serve(responses: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        format!("http://{addr}")
    }

    /// Consumes the request head and its body, if any.
    async fn read_request(socket: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        let head_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
            if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
        let length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        while request.len() < head_end + length {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
    }

    fn credential() -> Credential {
        Credential {
            user_id: 7,
            token: "token".into(),
        }
    }

    fn local_client(base: &str) -> ApiClient {
        ApiClient::new(base, "oficina-central", Duration::from_secs(5)).unwrap()
    }

    fn client() -> ApiClient {
        ApiClient::new(
            "http://localhost:3000/api/proxy/",
            "/oficina-central/",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn urls() {
        let api = client();
        assert_eq!(
            api.preset_url(None),
            "http://localhost:3000/api/proxy/column-presets"
        );
        assert_eq!(
            api.preset_url(Some(PresetId(3))),
            "http://localhost:3000/api/proxy/column-presets/3"
        );
        assert_eq!(
            api.resource_url("ordens-servico"),
            "http://localhost:3000/api/proxy/oficina-central/ordens-servico"
        );
    }

    #[test]
    fn page_query_skips_blank_search() {
        let mut query = PageQuery {
            page: 2,
            per_page: 25,
            search: Some("  ".into()),
            sort: None,
        };
        assert_eq!(
            query.params(),
            vec![("page", "2".to_string()), ("per_page", "25".to_string())]
        );
        query.search = Some(" silva ".into());
        assert_eq!(query.params()[2], ("search", "silva".to_string()));

        query.sort = Some(Sort {
            key: "nome".into(),
            ascending: false,
        });
        assert_eq!(
            query.params()[3..],
            [
                ("sort_by", "nome".to_string()),
                ("sort_dir", "desc".to_string())
            ]
        );
    }

    #[test]
    fn paginated_body() {
        let body: PageBody = serde_json::from_value(json!({
            "data": [{"id": 1}, {"id": 2}],
            "current_page": 2,
            "last_page": 5,
            "total": 90
        }))
        .unwrap();
        let page = Page::from(body);
        assert_eq!(page.rows.len(), 2);
        assert_eq!((page.current_page, page.total_pages), (2, 5));
        assert_eq!(page.total, Some(90));
    }

    #[test]
    fn bare_array_is_a_single_page() {
        let body: PageBody = serde_json::from_value(json!([{"id": 1}])).unwrap();
        let page = Page::from(body);
        assert_eq!((page.current_page, page.total_pages), (1, 1));
        assert_eq!(page.total, Some(1));
    }

    #[test]
    fn preset_wire_format() {
        let preset = Preset {
            id: None,
            owner_id: 7,
            entity_name: "clientes".into(),
            visible_columns: vec!["id".into(), "nome".into()],
        };
        assert_eq!(
            serde_json::to_value(&preset).unwrap(),
            json!({"user_id": 7, "entity_name": "clientes", "visible_columns": ["id", "nome"]})
        );

        let stored: Option<Preset> = serde_json::from_value(json!({
            "id": 12, "user_id": 7, "entity_name": "clientes", "visible_columns": ["id"]
        }))
        .unwrap();
        assert_eq!(stored.unwrap().id, Some(PresetId(12)));
        let none: Option<Preset> = serde_json::from_value(Value::Null).unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn fetch_preset_status_mapping() {
        let base = serve(vec![
            (404, ""),
            (200, "null"),
            (401, ""),
            (500, "boom"),
            (200, "{"),
        ])
        .await;
        let api = local_client(&base);
        let credential = credential();
        let fetch = || api.fetch_preset(7, "clientes", &credential);

        assert_eq!(fetch().await.unwrap(), None);
        assert_eq!(fetch().await.unwrap(), None);
        assert!(matches!(fetch().await, Err(DieselError::Unauthenticated)));
        match fetch().await {
            Err(DieselError::Http { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected an HTTP error, got {other:?}"),
        }
        assert!(matches!(fetch().await, Err(DieselError::Parse(_))));
    }

    #[tokio::test]
    async fn update_of_a_deleted_preset_is_not_found() {
        let base = serve(vec![(404, "")]).await;
        let api = local_client(&base);
        let preset = Preset {
            id: None,
            owner_id: 7,
            entity_name: "clientes".into(),
            visible_columns: vec!["id".into()],
        };
        let err = api
            .update_preset(PresetId(3), &preset, &credential())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn server_error_on_load_falls_back_to_defaults() {
        let base = serve(vec![(500, "")]).await;
        let presets = PresetManager::new(
            Arc::new(local_client(&base)),
            Arc::new(StaticCredentials::new(7, "token")),
        );
        let defaults = keys(&["id", "nome"]);
        let visible = presets
            .load("clientes", &defaults, &keys(&["id", "nome", "email"]))
            .await;
        assert_eq!(visible, defaults);
        assert_eq!(presets.state().await, PresetState::LoadedDefault);
    }
}
