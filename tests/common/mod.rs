//! Shared fixtures: in-memory archives, a mocked vendor API and tree snapshots

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use bedrock_updater::config::UpdaterConfig;
use serde_json::json;
use walkdir::WalkDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

pub const API_PATH: &str = "/api/v1.0/download/links";

/// Zip archive from `(name, contents)` pairs; names ending in `/` are directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .expect("add directory");
        } else {
            writer
                .start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
                .expect("start file");
            writer.write_all(body).expect("write entry");
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

/// What the vendor ships in a server archive.
pub fn server_archive(build: &str) -> Vec<u8> {
    let binary = format!("bedrock_server {build}");
    zip_bytes(&[
        ("bedrock_server", binary.as_bytes()),
        ("server.properties", b"server-name=Dedicated Server\n"),
        ("permissions.json", b"[]\n"),
        ("allowlist.json", b"[]\n"),
        ("behavior_packs/", b""),
        ("behavior_packs/vanilla/manifest.json", b"{\"format_version\": 2}"),
        ("release-notes.txt", b"notes"),
    ])
}

/// Test configuration pointing at the mock server with fast retries.
pub fn config_for(server: &MockServer) -> UpdaterConfig {
    let mut config = UpdaterConfig::default();
    config.api.urls = vec![format!("{}{API_PATH}", server.uri())];
    config.api.timeout_secs = 5;
    config.download.timeout_secs = 5;
    config.download.retry_backoff_ms = 1;
    config.download.max_retries = 3;
    config
}

pub fn archive_url(server: &MockServer, dir: &str, version: &str) -> String {
    format!("{}/{dir}/bedrock-server-{version}.zip", server.uri())
}

pub fn catalogue(server: &MockServer, version: &str) -> serde_json::Value {
    json!({
        "result": {
            "links": [
                {"downloadType": "serverBedrockWindows", "downloadUrl": archive_url(server, "bin-win", version)},
                {"downloadType": "serverBedrockLinux", "downloadUrl": archive_url(server, "bin-linux", version)},
                {"downloadType": "serverBedrockPreviewLinux", "downloadUrl": archive_url(server, "bin-linux-preview", "1.21.130.22")},
                {"downloadType": "serverJar", "downloadUrl": format!("{}/server.jar", server.uri())}
            ]
        }
    })
}

/// Serve the catalogue for `version`.
pub async fn mount_catalogue(server: &MockServer, version: &str) {
    Mock::given(method("GET"))
        .and(path(API_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalogue(server, version)))
        .mount(server)
        .await;
}

/// Serve the Linux release archive, expecting `hits` downloads.
pub async fn mount_archive(server: &MockServer, version: &str, body: Vec<u8>, hits: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/bin-linux/bedrock-server-{version}.zip")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(hits)
        .mount(server)
        .await;
}

/// A populated server directory at `parent/server`, recording `version`.
pub fn existing_server(parent: &Path, version: &str) -> PathBuf {
    let target = parent.join("server");
    fs::create_dir_all(target.join("worlds/Bedrock level/db")).expect("mkdir");
    fs::write(
        target.join("bedrock_server_exe.version"),
        format!("Bedrock Server {version}\n"),
    )
    .expect("write version");
    fs::write(target.join("bedrock_server"), "bedrock_server old").expect("write");
    fs::write(target.join("server.properties"), "server-name=My World\nmax-players=4\n")
        .expect("write");
    fs::write(target.join("allowlist.json"), "[{\"name\":\"steve\"}]").expect("write");
    fs::write(target.join("worlds/Bedrock level/level.dat"), [1u8, 2, 3, 4]).expect("write");
    fs::write(target.join("worlds/Bedrock level/db/CURRENT"), "MANIFEST-000001").expect("write");
    target
}

/// Relative path → file contents (`None` for directories).
pub fn tree(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| e.expect("walk"))
        .map(|e| {
            let rel = e.path().strip_prefix(root).expect("prefix").to_path_buf();
            let body = e
                .file_type()
                .is_file()
                .then(|| fs::read(e.path()).expect("read"));
            (rel, body)
        })
        .collect()
}

/// Entries of `dir` other than `keep`.
pub fn siblings(dir: &Path, keep: &str) -> Vec<String> {
    fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name != keep)
        .collect()
}
