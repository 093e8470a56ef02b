use super::{check_exit, ExecOutput, ExecSpec, Input, Sandbox, SandboxError};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";

const CONTAINER_NAME_PREFIX: &str = "shipwright";

/// Runs each [`ExecSpec`] in a fresh Docker container that is force-removed
/// afterwards, whatever the outcome.
pub struct DockerSandbox {
    docker: Docker,
    timeout: Duration,
    pull_images: bool,
}

impl DockerSandbox {
    pub fn connect(timeout: Duration, pull_images: bool) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::Unavailable(e.to_string()))?;
        Ok(Self {
            docker,
            timeout,
            pull_images,
        })
    }

    pub fn from_config(config: &crate::config::ShipwrightConfig) -> Result<Self, SandboxError> {
        Self::connect(
            Duration::from_secs(config.sandbox_timeout_secs),
            config.pull_images,
        )
    }

    async fn pull_image(&self, image: &str) -> Result<(), SandboxError> {
        debug!(image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| SandboxError::ImagePull {
                image: image.to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    async fn binds(spec: &ExecSpec) -> Result<Vec<String>, SandboxError> {
        let mut binds = Vec::new();
        for input in &spec.inputs {
            let (host, mount_path) = match input {
                Input::HostDir { host, mount_path } | Input::HostFile { host, mount_path } => {
                    (host, mount_path)
                }
                Input::Content { .. } => continue,
            };

            let resolved = tokio::fs::canonicalize(host)
                .await
                .map_err(|e| SandboxError::InvalidInput {
                    path: host.display().to_string(),
                    message: e.to_string(),
                })?;

            if matches!(input, Input::HostDir { .. }) && !resolved.is_dir() {
                return Err(SandboxError::InvalidInput {
                    path: host.display().to_string(),
                    message: "not a directory".to_string(),
                });
            }

            binds.push(format!("{}:{}:ro", resolved.display(), mount_path));
        }
        Ok(binds)
    }

    fn content_archive(spec: &ExecSpec) -> Result<Option<Vec<u8>>, SandboxError> {
        let contents: Vec<(&str, &str)> = spec
            .inputs
            .iter()
            .filter_map(|input| match input {
                Input::Content {
                    mount_path,
                    content,
                } => Some((mount_path.as_str(), content.as_str())),
                _ => None,
            })
            .collect();

        if contents.is_empty() {
            return Ok(None);
        }

        let mut builder = tar::Builder::new(Vec::new());
        for (mount_path, content) in contents {
            let relative = mount_path.trim_start_matches('/');
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, Path::new(relative), content.as_bytes())
                .map_err(|e| SandboxError::InvalidInput {
                    path: mount_path.to_string(),
                    message: e.to_string(),
                })?;
        }

        builder
            .into_inner()
            .map(Some)
            .map_err(|e| SandboxError::runtime("archive", e))
    }

    async fn wait_for_exit(&self, id: &str) -> Result<i64, SandboxError> {
        let mut stream = self
            .docker
            .wait_container(id, None::<WaitContainerOptions<String>>);

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(SandboxError::runtime("wait", e)),
            None => Err(SandboxError::runtime("wait", "no status reported")),
        }
    }

    async fn collect_logs(&self, id: &str) -> Result<(String, String), SandboxError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut stream = self.docker.logs(id, Some(options));

        while let Some(chunk) = stream.next().await {
            match chunk.map_err(|e| SandboxError::runtime("logs", e))? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.push_str(&String::from_utf8_lossy(&message))
                }
                LogOutput::StdErr { message } => stderr.push_str(&String::from_utf8_lossy(&message)),
                LogOutput::StdIn { .. } => {}
            }
        }

        Ok((stdout, stderr))
    }

    async fn execute(&self, name: &str, spec: &ExecSpec) -> Result<ExecOutput, SandboxError> {
        let binds = Self::binds(spec).await?;
        let archive = Self::content_archive(spec)?;

        let config = Config {
            image: Some(spec.image.clone()),
            entrypoint: Some(vec![spec.command.clone()]),
            cmd: Some(spec.args.clone()),
            env: Some(spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()),
            working_dir: spec.workdir.clone(),
            tty: Some(false),
            host_config: Some(HostConfig {
                binds: if binds.is_empty() { None } else { Some(binds) },
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| SandboxError::runtime("create", e))?;

        if let Some(archive) = archive {
            self.docker
                .upload_to_container(
                    name,
                    Some(UploadToContainerOptions {
                        path: "/".to_string(),
                        ..Default::default()
                    }),
                    archive.into(),
                )
                .await
                .map_err(|e| SandboxError::runtime("upload", e))?;
        }

        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::runtime("start", e))?;

        let exit_code = self.wait_for_exit(name).await?;
        let (stdout, stderr) = self.collect_logs(name).await?;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn remove(&self, name: &str) {
        let result = self
            .docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        if let Err(e) = result {
            warn!(container = name, error = %e, "Failed to remove container");
        }
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn run(
        &self,
        spec: &ExecSpec,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput, SandboxError> {
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        if self.pull_images {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
                pulled = self.pull_image(&spec.image) => pulled?,
            }
        }

        let name = format!("{}-{}", CONTAINER_NAME_PREFIX, uuid::Uuid::new_v4());
        info!(
            image = %spec.image,
            command = %spec.command,
            container = %name,
            "Running sandboxed command"
        );

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SandboxError::Cancelled),
            _ = tokio::time::sleep(self.timeout) => Err(SandboxError::Timeout {
                seconds: self.timeout.as_secs(),
            }),
            result = self.execute(&name, spec) => result,
        };

        self.remove(&name).await;

        let output = outcome?;
        debug!(
            container = %name,
            exit_code = output.exit_code,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "Sandboxed command finished"
        );
        check_exit(spec, output)
    }

    fn name(&self) -> &str {
        "docker"
    }
}

/// Returns the daemon API version when Docker is reachable.
pub async fn check_docker() -> anyhow::Result<Option<String>> {
    let socket_present = Path::new(DOCKER_SOCKET_PATH).exists();
    if !socket_present && std::env::var("DOCKER_HOST").is_err() {
        debug!("Docker socket not found at {}", DOCKER_SOCKET_PATH);
        return Ok(None);
    }

    let docker = match Docker::connect_with_local_defaults() {
        Ok(d) => d,
        Err(e) => {
            debug!("Failed to connect to Docker: {}", e);
            return Ok(None);
        }
    };

    match docker.version().await {
        Ok(v) => {
            let api_version = v.api_version.unwrap_or_else(|| "unknown".to_string());
            debug!("Docker API version: {}", api_version);
            Ok(Some(api_version))
        }
        Err(e) => {
            debug!("Failed to get Docker version: {}", e);
            Ok(None)
        }
    }
}
