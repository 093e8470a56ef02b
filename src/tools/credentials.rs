//! Cloud credentials forwarded into query sandboxes

use crate::cloud::CloudProvider;
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use tracing::debug;

pub type Credentials = BTreeMap<String, String>;

const AWS_ENV_VARS: &[&str] = &["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_SESSION_TOKEN"];
const AZURE_ENV_VARS: &[&str] = &["AZURE_TENANT_ID", "AZURE_CLIENT_ID", "AZURE_CLIENT_SECRET"];
const GCP_ENV_VARS: &[&str] = &["GOOGLE_APPLICATION_CREDENTIALS"];

fn copy_env(creds: &mut Credentials, keys: &[&str]) {
    for key in keys {
        if let Ok(value) = env::var(key) {
            if !value.is_empty() {
                creds.insert(key.to_string(), value);
            }
        }
    }
}

/// Collects credentials for `provider` from the environment.
///
/// AWS always carries `AWS_REGION` (falling back to `default_region`) and,
/// when no access key is exported, reads the `[default]` profile of
/// `~/.aws/credentials`.
pub fn provider_credentials(provider: CloudProvider, default_region: &str) -> Credentials {
    let mut creds = Credentials::new();

    match provider {
        CloudProvider::Aws => {
            copy_env(&mut creds, AWS_ENV_VARS);

            let region = env::var("AWS_REGION")
                .ok()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| default_region.to_string());
            creds.insert("AWS_REGION".to_string(), region);

            if !creds.contains_key("AWS_ACCESS_KEY_ID") {
                if let Some(path) = aws_credentials_path() {
                    if let Ok(content) = std::fs::read_to_string(&path) {
                        debug!(path = %path.display(), "Reading AWS default profile");
                        creds.extend(parse_aws_default_profile(&content));
                    }
                }
            }
        }
        CloudProvider::Azure => copy_env(&mut creds, AZURE_ENV_VARS),
        CloudProvider::Gcp => copy_env(&mut creds, GCP_ENV_VARS),
    }

    creds
}

fn aws_credentials_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_SHARED_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".aws").join("credentials"))
}

/// Extracts the access key pair from the `[default]` section of an AWS
/// shared credentials file.
pub fn parse_aws_default_profile(content: &str) -> Credentials {
    let mut creds = Credentials::new();
    let mut in_default = false;

    for line in content.lines().map(str::trim) {
        if line.starts_with('[') {
            in_default = line == "[default]";
            continue;
        }
        if !in_default {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let env_key = match key.trim() {
            "aws_access_key_id" => "AWS_ACCESS_KEY_ID",
            "aws_secret_access_key" => "AWS_SECRET_ACCESS_KEY",
            "aws_session_token" => "AWS_SESSION_TOKEN",
            _ => continue,
        };
        creds.insert(env_key.to_string(), value.trim().to_string());
    }

    creds
}
