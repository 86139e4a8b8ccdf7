use super::{HistoryEvent, HistoryIter, QueueItem, RemoteCommand};
use crate::error::Result;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;
use url::Url;

const API_PREFIX: &str = "api/v3/";
const PAGE_SIZE: u32 = 250;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking client for the v3 API shared by Sonarr and Radarr.
pub struct ArrClient {
    http: Client,
    base: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default)]
    total_records: u64,
    #[serde(default = "Vec::new")]
    records: Vec<T>,
}

impl ArrClient {
    pub fn new(url: &str, api_key: &str) -> Result<Self> {
        let mut base = url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)?.join(API_PREFIX)?;

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)?;
        key.set_sensitive(true);
        headers.insert("X-Api-Key", key);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = self.base.join(path)?;
        debug!("GET {} {:?}", url, query);
        let resp = self.http.get(url).query(query).send()?.error_for_status()?;
        Ok(resp.json()?)
    }

    pub fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base.join(path)?;
        debug!("POST {}", url);
        let resp = self.http.post(url).json(body).send()?.error_for_status()?;
        Ok(resp.json()?)
    }

    pub fn delete(&self, path: &str, query: &[(&str, String)]) -> Result<()> {
        let url = self.base.join(path)?;
        debug!("DELETE {} {:?}", url, query);
        self.http.delete(url).query(query).send()?.error_for_status()?;
        Ok(())
    }

    pub fn history(&self) -> HistoryIter<'_> {
        Box::new(HistoryPages {
            client: self,
            page: 0,
            buf: VecDeque::new(),
            done: false,
        })
    }

    pub fn commands(&self) -> Result<Vec<RemoteCommand>> {
        self.get("command", &[])
    }

    pub fn command(&self, id: u64) -> Result<RemoteCommand> {
        self.get(&format!("command/{}", id), &[])
    }

    pub fn run_command<B: Serialize>(&self, body: &B) -> Result<RemoteCommand> {
        self.post("command", body)
    }

    pub fn queue(&self) -> Result<Vec<QueueItem>> {
        let mut items = Vec::new();
        for page in 1.. {
            let resp: Page<QueueItem> = self.get("queue", &[
                ("page", page.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ])?;
            let fetched = resp.records.len();
            items.extend(resp.records);
            if fetched < PAGE_SIZE as usize || items.len() as u64 >= resp.total_records {
                break;
            }
        }
        Ok(items)
    }

    pub fn queue_del(&self, id: u64, blacklist: bool) -> Result<()> {
        self.delete(&format!("queue/{}", id), &[
            ("removeFromClient", "true".to_string()),
            ("blocklist", blacklist.to_string()),
        ])
    }
}

struct HistoryPages<'a> {
    client: &'a ArrClient,
    page: u32,
    buf: VecDeque<HistoryEvent>,
    done: bool,
}

impl HistoryPages<'_> {
    fn fetch_next(&mut self) -> Result<()> {
        self.page += 1;
        let resp: Page<HistoryEvent> = self.client.get("history", &[
            ("page", self.page.to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
            ("sortKey", "date".to_string()),
            ("sortDirection", "descending".to_string()),
        ])?;
        let seen = u64::from(self.page - 1) * u64::from(PAGE_SIZE) + resp.records.len() as u64;
        if resp.records.len() < PAGE_SIZE as usize || seen >= resp.total_records {
            self.done = true;
        }
        self.buf.extend(resp.records);
        Ok(())
    }
}

impl Iterator for HistoryPages<'_> {
    type Item = Result<HistoryEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buf.is_empty() {
            if self.done {
                return None;
            }
            if let Err(e) = self.fetch_next() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buf.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_api_prefix() {
        let client = ArrClient::new("http://localhost:8989", "key").unwrap();
        assert_eq!(client.base().as_str(), "http://localhost:8989/api/v3/");

        let client = ArrClient::new("http://host/sonarr/", "key").unwrap();
        assert_eq!(client.base().as_str(), "http://host/sonarr/api/v3/");
    }

    #[test]
    fn test_invalid_api_key_rejected() {
        assert!(ArrClient::new("http://localhost:8989", "bad\nkey").is_err());
    }
}
