//! In-memory Drive backend for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use serde_json::{json, Value};
use url::Url;

use crate::types::FOLDER_MIME_TYPE;

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Folder {
    parent: String,
    name: String,
    deleted: bool,
}

#[derive(Default)]
struct DriveState {
    next_id: usize,
    folders: HashMap<String, Folder>,
    files: HashMap<String, StoredFile>,
    permissions: Vec<String>,
    folder_creates: usize,
    requests: usize,
}

pub struct FakeDrive {
    state: Mutex<DriveState>,
    permission_status: u16,
    upload_status: u16,
    include_links: bool,
}

impl FakeDrive {
    pub const API_BASE: &'static str = "https://drive.test/drive/v3";
    pub const UPLOAD_BASE: &'static str = "https://drive.test/upload/drive/v3";

    pub fn new() -> Self {
        Self {
            state: Mutex::new(DriveState::default()),
            permission_status: 200,
            upload_status: 200,
            include_links: true,
        }
    }

    pub fn with_permission_status(mut self, status: u16) -> Self {
        self.permission_status = status;
        self
    }

    pub fn with_upload_status(mut self, status: u16) -> Self {
        self.upload_status = status;
        self
    }

    pub fn without_links(mut self) -> Self {
        self.include_links = false;
        self
    }

    pub fn folder_creates(&self) -> usize {
        self.state.lock().unwrap().folder_creates
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests
    }

    pub fn permissions(&self) -> Vec<String> {
        self.state.lock().unwrap().permissions.clone()
    }

    pub fn uploaded(&self, id: &str) -> Option<StoredFile> {
        self.state.lock().unwrap().files.get(id).cloned()
    }

    pub fn parent_of(&self, folder_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .folders
            .get(folder_id)
            .map(|folder| folder.parent.clone())
    }

    /// Walk a path from `root` through live folders.
    pub fn folder_id(&self, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        let mut parent = "root".to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            parent = find_live(&state, &parent, segment)?;
        }
        Some(parent)
    }

    pub fn delete_folder(&self, folder_id: &str) {
        if let Some(folder) = self.state.lock().unwrap().folders.get_mut(folder_id) {
            folder.deleted = true;
        }
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let url = Url::parse(&request.url).unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let path = url.path().to_string();
        let mut state = self.state.lock().unwrap();
        state.requests += 1;

        match (request.method, path.as_str()) {
            (HttpMethod::Get, "/drive/v3/files") => {
                let (name, parent) = parse_folder_query(&query["q"]);
                let files: Vec<Value> = find_live(&state, &parent, &name)
                    .map(|id| json!({ "id": id, "name": name }))
                    .into_iter()
                    .collect();
                ok(json!({ "files": files }))
            }
            (HttpMethod::Post, "/drive/v3/files") => {
                let body: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
                assert_eq!(body["mimeType"], FOLDER_MIME_TYPE);
                let parent = body["parents"][0].as_str().unwrap().to_string();
                if !is_live_parent(&state, &parent) {
                    return not_found(&parent);
                }
                let id = next_id(&mut state, "folder");
                state.folders.insert(
                    id.clone(),
                    Folder {
                        parent,
                        name: body["name"].as_str().unwrap().to_string(),
                        deleted: false,
                    },
                );
                state.folder_creates += 1;
                ok(json!({ "id": id }))
            }
            (HttpMethod::Post, "/upload/drive/v3/files") => {
                assert_eq!(query["uploadType"], "multipart");
                if self.upload_status != 200 {
                    return error(self.upload_status, "Backend Error");
                }
                let content_type = request.header_value("content-type").unwrap();
                let boundary = content_type.split("boundary=").nth(1).unwrap();
                let (metadata, content) = parse_multipart(request.body.as_deref().unwrap(), boundary);
                let parents: Vec<String> = metadata["parents"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|p| p.as_str().unwrap().to_string())
                    .collect();
                if !parents.iter().all(|p| is_live_parent(&state, p)) {
                    return not_found(&parents.join(","));
                }
                let id = next_id(&mut state, "file");
                let file = StoredFile {
                    name: metadata["name"].as_str().unwrap().to_string(),
                    mime_type: metadata["mimeType"].as_str().unwrap().to_string(),
                    parents,
                    content,
                };
                let mut response = json!({
                    "id": id,
                    "name": file.name,
                    "mimeType": file.mime_type,
                });
                if self.include_links {
                    response["webViewLink"] =
                        json!(format!("https://drive.google.com/file/d/{}/view?usp=drivesdk", id));
                    response["webContentLink"] =
                        json!(format!("https://drive.google.com/uc?id={}&export=download", id));
                }
                state.files.insert(id, file);
                ok(response)
            }
            (HttpMethod::Post, path) if path.ends_with("/permissions") => {
                let id = path
                    .trim_start_matches("/drive/v3/files/")
                    .trim_end_matches("/permissions")
                    .to_string();
                let body: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
                assert_eq!(body, json!({ "role": "reader", "type": "anyone" }));
                if self.permission_status != 200 {
                    return error(self.permission_status, "The user does not have sufficient permissions");
                }
                if !state.files.contains_key(&id) {
                    return not_found(&id);
                }
                state.permissions.push(id);
                ok(json!({ "id": "anyoneWithLink", "type": "anyone", "role": "reader" }))
            }
            _ => not_found(&path),
        }
    }
}

#[async_trait]
impl HttpClient for FakeDrive {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        assert!(request.header_value("authorization").is_some());
        tokio::task::yield_now().await;
        Ok(self.handle(&request))
    }
}

fn next_id(state: &mut DriveState, prefix: &str) -> String {
    state.next_id += 1;
    format!("{}-{}", prefix, state.next_id)
}

fn find_live(state: &DriveState, parent: &str, name: &str) -> Option<String> {
    state
        .folders
        .iter()
        .find(|(_, f)| !f.deleted && f.parent == parent && f.name == name)
        .map(|(id, _)| id.clone())
}

fn is_live_parent(state: &DriveState, id: &str) -> bool {
    id == "root" || state.folders.get(id).map_or(false, |f| !f.deleted)
}

/// Pull the name and parent literals out of
/// `name = '<name>' and '<parent>' in parents and ...`.
fn parse_folder_query(q: &str) -> (String, String) {
    let rest = q.strip_prefix("name = '").unwrap();
    let (name, rest) = read_literal(rest);
    let rest = rest.strip_prefix(" and '").unwrap();
    let (parent, rest) = read_literal(rest);
    assert!(rest.starts_with(" in parents and mimeType = 'application/vnd.google-apps.folder' and trashed = false"));
    (name, parent)
}

fn read_literal(input: &str) -> (String, &str) {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next().unwrap();
                value.push(escaped);
            }
            '\'' => return (value, &input[i + 1..]),
            other => value.push(other),
        }
    }
    panic!("unterminated literal in {}", input);
}

fn parse_multipart(body: &[u8], boundary: &str) -> (Value, Vec<u8>) {
    let body = std::str::from_utf8(body).unwrap();
    let delimiter = format!("--{}\r\n", boundary);
    let parts: Vec<&str> = body.split(delimiter.as_str()).collect();
    let (_, json_part) = parts[1].split_once("\r\n\r\n").unwrap();
    let metadata: Value = serde_json::from_str(json_part.trim_end()).unwrap();
    let (headers, encoded) = parts[2].split_once("\r\n\r\n").unwrap();
    assert!(headers.contains("Content-Transfer-Encoding: base64"));
    let encoded = encoded
        .strip_suffix(&format!("\r\n--{}--\r\n", boundary))
        .unwrap();
    (metadata, STANDARD.decode(encoded).unwrap())
}

fn ok(body: Value) -> HttpResponse {
    HttpResponse::new(200, body.to_string())
}

fn error(status: u16, message: &str) -> HttpResponse {
    HttpResponse::new(
        status,
        json!({ "error": { "code": status, "message": message } }).to_string(),
    )
}

fn not_found(what: &str) -> HttpResponse {
    error(404, &format!("File not found: {}.", what))
}
