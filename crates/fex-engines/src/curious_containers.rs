//! The curious-containers execution engine: remote dispatch over HTTP, plus
//! the local-VM provisioning path that boots the whole service stack inside
//! a virtual machine.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tracing::{info, warn};

use fex_core::{
    ensure_dir, find_open_port, http_client, write_text, Descriptions, Document, Error, Result,
};

use crate::adapt::{adapt_connectors, adapt_engine_endpoint, AdaptOptions, FILE_SERVER_URL};
use crate::runbook::Runbook;
use crate::vagrant::{
    render_vagrantfile, VmDefinition, DEFAULT_VM_CPUS, DEFAULT_VM_MEMORY_MB, PROVISION_FILE_NAME,
    VAGRANT_FILE_NAME, VM_USER,
};
use crate::{
    Engine, InstructionsReport, LocalityOptions, ProvisioningBundle, RemoteSchemaStatus,
    SubmissionResult, CURIOUS_CONTAINERS,
};

const GUEST_SERVICE_PORT: u16 = 8000;
const DOCKER_COMPOSE_VERSION: &str = "1.14.0";
const HEALTH_CHECK_ATTEMPTS: u32 = 30;
const HEALTH_CHECK_SLEEP_SECONDS: u32 = 10;
const LOCAL_USERNAME: &str = "user";
const LOCAL_PASSWORD_LENGTH: usize = 16;

const COMPOSE_FILE_NAME: &str = "docker-compose.yml";
const APACHE_FILE_NAME: &str = "apache.conf";
const CREDENTIALS_FILE_NAME: &str = "credentials.toml";
const EXPERIMENT_FILE_NAME: &str = "experiment.json";
const INPUT_FILES_DIR: &str = "input_files";
const RESULT_FILES_DIR: &str = "result_files";
const LOGS_DIR: &str = "logs";

pub struct CuriousContainersEngine;

struct EngineConfig {
    url: String,
    username: String,
    password: String,
    engine_version: String,
    host_ram: u64,
    host_cpus: u64,
}

fn engine_config(doc: &Document) -> Result<EngineConfig> {
    let config = doc.engine_config();
    let url = string_field(config, "/url")?;
    let username = string_field(config, "/auth/username")?;
    let password = string_field(config, "/auth/password")?;
    let engine_version = string_field(config, "/install_requirements/engine_version")?;
    let host_ram = config
        .pointer("/install_requirements/host_ram")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_VM_MEMORY_MB);
    let host_cpus = config
        .pointer("/install_requirements/host_cpus")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_VM_CPUS);
    Ok(EngineConfig {
        url,
        username,
        password,
        engine_version,
        host_ram,
        host_cpus,
    })
}

fn string_field(config: &Value, pointer: &str) -> Result<String> {
    config
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            Error::MalformedDocument(format!("engine_config is missing string field {}", pointer))
        })
}

fn tasks_endpoint(base_url: &str) -> String {
    format!("{}/tasks", base_url.trim_end_matches('/'))
}

fn schema_endpoint(base_url: &str) -> String {
    format!("{}/tasks/schema", base_url.trim_end_matches('/'))
}

fn fetch_instructions_schema(config: &EngineConfig) -> std::result::Result<Value, String> {
    let url = schema_endpoint(&config.url);
    let client = http_client().map_err(|e| e.to_string())?;
    let response = client
        .get(&url)
        .basic_auth(&config.username, Some(&config.password))
        .send()
        .map_err(|e| format!("GET {} failed: {}", url, e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("GET {} returned status {}", url, status));
    }
    response
        .json::<Value>()
        .map_err(|e| format!("GET {} returned invalid json: {}", url, e))
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(LOCAL_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

impl Engine for CuriousContainersEngine {
    fn engine_type(&self) -> &'static str {
        CURIOUS_CONTAINERS
    }

    fn validate_engine_config(&self, doc: &Document) -> Result<()> {
        let schema = fex_schemas::compile_schema(fex_schemas::CC_ENGINE_CONFIG_SCHEMA)?;
        fex_schemas::validate_against(&schema, doc.engine_config(), "engine_config")
    }

    fn validate_instructions(&self, doc: &Document) -> Result<InstructionsReport> {
        let instructions = doc.instructions();
        if instructions.get("tasks").is_some() {
            return Err(Error::UnsupportedFeature(
                "multi-task instructions are not supported, provide a single task".to_string(),
            ));
        }
        let schema = fex_schemas::compile_schema(fex_schemas::CC_INSTRUCTIONS_SCHEMA)?;
        fex_schemas::validate_against(&schema, instructions, "instructions")?;

        let config = engine_config(doc)?;
        let remote_schema = match fetch_instructions_schema(&config) {
            Ok(schema_value) => match fex_schemas::compile_value(&schema_value, "instructions") {
                Ok(remote) => {
                    fex_schemas::validate_against(
                        &remote,
                        instructions,
                        "instructions (remote schema)",
                    )?;
                    RemoteSchemaStatus::Validated
                }
                Err(err) => RemoteSchemaStatus::Unavailable {
                    reason: format!("remote schema does not compile: {}", err),
                },
            },
            Err(reason) => {
                warn!(%reason, "remote instructions schema unavailable, skipping remote validation");
                RemoteSchemaStatus::Unavailable { reason }
            }
        };
        Ok(InstructionsReport { remote_schema })
    }

    fn validate_meta_data(&self, doc: &Document) -> Result<()> {
        let meta = doc.meta_data();
        let instructions = doc.instructions();

        let instruction_inputs = instructions
            .pointer("/input_files")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                Error::MalformedDocument("instructions.input_files must be an array".to_string())
            })?;
        if instruction_inputs.len() != meta.input_files.len() {
            return Err(Error::InconsistentMetaData(format!(
                "instructions reference {} input files but meta_data describes {}",
                instruction_inputs.len(),
                meta.input_files.len()
            )));
        }
        if meta.input_files.any_optional() {
            return Err(Error::UnsupportedFeature(
                "optional input files are not supported by the curious-containers engine"
                    .to_string(),
            ));
        }

        let result_names = instruction_result_names(instructions)?;
        match &meta.result_files {
            Descriptions::Named(entries) => {
                for name in &result_names {
                    if !entries.contains_key(name.as_str()) {
                        return Err(Error::InconsistentMetaData(format!(
                            "result file '{}' has no description in meta_data.result_files",
                            name
                        )));
                    }
                }
            }
            Descriptions::Positional(_) => {
                return Err(Error::InconsistentMetaData(
                    "meta_data.result_files must be a named mapping for the curious-containers engine"
                        .to_string(),
                ));
            }
        }

        if let Some(applications) = &meta.applications {
            for entry in applications.values() {
                fex_schemas::validate_source_reference(entry)?;
            }
        }
        Ok(())
    }

    fn adapt(&self, doc: &Document, options: &AdaptOptions) -> Result<Document> {
        adapt_connectors(doc, options)
    }

    fn run(&self, doc: &Document) -> Result<SubmissionResult> {
        let config = engine_config(doc)?;
        let url = tasks_endpoint(&config.url);
        info!(%url, "submitting instructions");
        let client = http_client()?;
        let response = client
            .post(&url)
            .basic_auth(&config.username, Some(&config.password))
            .json(doc.instructions())
            .send()
            .map_err(|e| Error::ResourceUnavailable(format!("POST {} failed: {}", url, e)))?;
        let status = response.status();
        let body = response.text().map_err(|e| {
            Error::ResourceUnavailable(format!("could not read response of {}: {}", url, e))
        })?;
        if !status.is_success() {
            return Err(Error::SubmissionRejected {
                status: status.as_u16(),
                body,
            });
        }
        let response = serde_json::from_str(&body).unwrap_or(Value::String(body));
        Ok(SubmissionResult { response })
    }

    fn provision(
        &self,
        doc: &Document,
        output_directory: &Path,
        options: &LocalityOptions,
    ) -> Result<ProvisioningBundle> {
        self.validate_meta_data(doc)?;
        let config = engine_config(doc)?;
        let host_port = find_open_port()?;
        let password = generate_password();

        let adapted = if options.use_local_data {
            self.adapt(doc, &AdaptOptions::local())?
        } else {
            doc.clone()
        };
        let rewritten = adapt_engine_endpoint(
            &adapted,
            &format!("http://localhost:{}", host_port),
            LOCAL_USERNAME,
            &password,
        )?;

        ensure_dir(output_directory)?;
        let artifacts = [
            (
                VAGRANT_FILE_NAME,
                render_vagrantfile(&VmDefinition {
                    memory_mb: config.host_ram,
                    cpus: config.host_cpus,
                    forwarded_port: Some((GUEST_SERVICE_PORT, host_port)),
                    provision_script: PROVISION_FILE_NAME,
                }),
            ),
            (
                PROVISION_FILE_NAME,
                render_provision_script(&config.engine_version),
            ),
            (COMPOSE_FILE_NAME, render_compose_file()),
            (APACHE_FILE_NAME, render_apache_config()),
            (
                CREDENTIALS_FILE_NAME,
                render_credentials(LOCAL_USERNAME, &password),
            ),
            (EXPERIMENT_FILE_NAME, rewritten.to_pretty_json()? + "\n"),
        ];
        let mut files = Vec::new();
        for (name, content) in artifacts {
            let path = output_directory.join(name);
            write_text(&path, &content)?;
            files.push(path);
        }
        for dir in [INPUT_FILES_DIR, RESULT_FILES_DIR, LOGS_DIR] {
            ensure_dir(&output_directory.join(dir))?;
        }

        info!(
            directory = %output_directory.display(),
            port = host_port,
            "wrote provisioning bundle"
        );
        let runbook = build_runbook(doc, output_directory, host_port, options);
        Ok(ProvisioningBundle {
            output_directory: output_directory.to_path_buf(),
            files,
            forwarded_port: Some(host_port),
            runbook: runbook.render(),
        })
    }
}

fn instruction_result_names(instructions: &Value) -> Result<BTreeSet<String>> {
    let result_files = instructions
        .pointer("/result_files")
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            Error::MalformedDocument("instructions.result_files must be an array".to_string())
        })?;
    let mut names = BTreeSet::new();
    for result_file in result_files {
        let name = result_file
            .get("local_result_file")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::MalformedDocument(
                    "instructions.result_files entries must carry local_result_file".to_string(),
                )
            })?;
        names.insert(name.to_string());
    }
    Ok(names)
}

fn render_provision_script(engine_version: &str) -> String {
    let mut lines = vec![
        "#!/usr/bin/env bash".to_string(),
        String::new(),
        "# bash strict mode".to_string(),
        "set -euo pipefail".to_string(),
        String::new(),
        "apt-get update".to_string(),
        "apt-get install -y git docker.io".to_string(),
        String::new(),
        format!("usermod -aG docker {}", VM_USER),
        String::new(),
        format!(
            "curl -L https://github.com/docker/compose/releases/download/{}/docker-compose-$(uname -s)-$(uname -m) > /usr/local/bin/docker-compose",
            DOCKER_COMPOSE_VERSION
        ),
        "chmod +x /usr/local/bin/docker-compose".to_string(),
        String::new(),
        "cd ~".to_string(),
        format!(
            "git clone -b {} --depth 1 https://github.com/curious-containers/cc-server.git",
            engine_version
        ),
        String::new(),
        "cd ~/cc-server".to_string(),
        format!("cp /vagrant/{} ./compose", COMPOSE_FILE_NAME),
        format!("cp /vagrant/{} ./compose", APACHE_FILE_NAME),
        format!("cp /vagrant/{} ./compose", CREDENTIALS_FILE_NAME),
        "bash compose/scripts/create_systemd_unit_file -d $(pwd)".to_string(),
        String::new(),
        "systemctl enable cc-server".to_string(),
        "systemctl start cc-server".to_string(),
        String::new(),
    ];
    lines.extend([
        format!("for attempt in $(seq 1 {})", HEALTH_CHECK_ATTEMPTS),
        "do".to_string(),
        format!(
            "    if curl -fs http://localhost:{}/ > /dev/null",
            GUEST_SERVICE_PORT
        ),
        "    then".to_string(),
        "        echo \"service is up after attempt ${attempt}\"".to_string(),
        "        break".to_string(),
        "    fi".to_string(),
        format!("    sleep {}", HEALTH_CHECK_SLEEP_SECONDS),
        "done".to_string(),
        String::new(),
    ]);
    lines.join("\n")
}

fn render_compose_file() -> String {
    let lines = [
        "version: \"2\"",
        "services:",
        "  cc-server-web:",
        "    build: ./cc-server-image",
        "    command: \"python3 -u /root/.config/curious-containers/cc-server-web/init.py\"",
        "    ports:",
        "      - \"8000:8000\"",
        "    volumes:",
        "      - ../cc_server_web:/opt/cc_server_web:ro",
        "      - ../cc_commons:/opt/cc_commons:ro",
        "      - .:/root/.config/curious-containers:ro",
        "    links:",
        "      - mongo",
        "      - cc-server-master",
        "      - cc-server-log",
        "    tty: true",
        "",
        "  cc-server-master:",
        "    build: ./cc-server-image",
        "    command: \"python3 -u /root/.config/curious-containers/cc-server-master/init.py\"",
        "    volumes:",
        "      - ../cc_server_master:/opt/cc_server_master:ro",
        "      - ../cc_commons:/opt/cc_commons:ro",
        "      - .:/root/.config/curious-containers:ro",
        "    links:",
        "      - mongo",
        "      - dind",
        "      - cc-server-log",
        "    depends_on:",
        "      - mongo-seed",
        "    tty: true",
        "",
        "  cc-server-log:",
        "    build: ./cc-server-image",
        "    command: \"python3 -u /opt/cc_server_log\"",
        "    volumes:",
        "      - ../cc_server_log:/opt/cc_server_log:ro",
        "      - ../cc_commons:/opt/cc_commons:ro",
        "      - .:/root/.config/curious-containers:ro",
        "      - /vagrant/logs:/root/.cc_server/logs",
        "    tty: true",
        "",
        "  mongo:",
        "    image: mongo",
        "    ports:",
        "      - \"27017:27017\"",
        "    volumes:",
        "      - /vagrant/mongo/db:/data/db",
        "    tty: true",
        "",
        "  mongo-seed:",
        "    build: ./mongo-seed",
        "    volumes:",
        "      - .:/root/.config/curious-containers",
        "    command: \"python3 -u /root/.config/curious-containers/mongo-seed/init.py\"",
        "    links:",
        "      - mongo",
        "    tty: true",
        "",
        "  dind:",
        "    image: docker:dind",
        "    privileged: true",
        "    command: \"docker daemon --insecure-registry=registry:5000 -H tcp://0.0.0.0:2375\"",
        "    volumes:",
        "      - /vagrant/dind/docker:/var/lib/docker",
        "    links:",
        "      - registry",
        "      - file-server",
        "    tty: true",
        "",
        "  file-server:",
        "    build: ./cc-server-image",
        "    command: \"gunicorn -w 4 -b 0.0.0.0:80 file_server.__main__:app\"",
        "    volumes:",
        "      - ./file_server:/opt/file_server:ro",
        "      - /vagrant/input_files:/root/input_files:ro",
        "      - /vagrant/result_files:/root/result_files",
        "    tty: true",
        "",
        "  registry:",
        "    image: registry:2",
        "    ports:",
        "      - \"5000:5000\"",
        "    environment:",
        "      REGISTRY_STORAGE_FILESYSTEM_ROOTDIRECTORY: /data",
        "    volumes:",
        "      - /vagrant/registry/data:/data",
        "",
    ];
    lines.join("\n")
}

fn render_apache_config() -> String {
    let lines = [
        "<VirtualHost *:80>".to_string(),
        "    ServerName localhost".to_string(),
        String::new(),
        "    ProxyPreserveHost On".to_string(),
        format!("    ProxyPass / http://localhost:{}/", GUEST_SERVICE_PORT),
        format!(
            "    ProxyPassReverse / http://localhost:{}/",
            GUEST_SERVICE_PORT
        ),
        "</VirtualHost>".to_string(),
        String::new(),
    ];
    lines.join("\n")
}

fn render_credentials(username: &str, password: &str) -> String {
    let lines = [
        "# service credentials generated for the local engine".to_string(),
        format!("generated_at = \"{}\"", Utc::now().to_rfc3339()),
        String::new(),
        "[auth]".to_string(),
        format!("username = \"{}\"", username),
        format!("password = \"{}\"", password),
        String::new(),
    ];
    lines.join("\n")
}

fn build_runbook(
    doc: &Document,
    output_directory: &Path,
    host_port: u16,
    options: &LocalityOptions,
) -> Runbook {
    let mut runbook = Runbook::new();
    let input_dir = output_directory.join(INPUT_FILES_DIR);
    let result_dir = output_directory.join(RESULT_FILES_DIR);

    runbook.blank();
    if options.use_local_data {
        runbook.step(format!(
            "Copy the input files listed below into {} before running the experiment:",
            input_dir.display()
        ));
        match &doc.meta_data().input_files {
            Descriptions::Positional(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    runbook.blank();
                    runbook.note(format!("file description: {}", entry.description));
                    runbook.note(format!(
                        "file location: {}",
                        input_dir.join(index.to_string()).display()
                    ));
                    runbook.note(format!("served as: {}/{}", FILE_SERVER_URL, index));
                }
            }
            Descriptions::Named(entries) => {
                for (name, entry) in entries {
                    runbook.blank();
                    runbook.note(format!("file description: {}", entry.description));
                    runbook.note(format!("file location: {}", input_dir.join(name).display()));
                }
            }
        }
        runbook.blank();
        runbook.note(format!(
            "The result files will be written to {}",
            result_dir.display()
        ));
    } else {
        runbook.note(
            "Input and result file connectors still point at their remote endpoints; \
             no local files need to be staged.",
        );
    }

    runbook.blank();
    runbook.step(format!(
        "Change to {} and run: vagrant up --provider virtualbox \
         (Vagrant and VirtualBox are required beforehand)",
        output_directory.display()
    ));
    runbook.blank();
    runbook.step(format!(
        "Wait until the engine responds at http://localhost:{}/ \
         (the provisioning script polls the same endpoint)",
        host_port
    ));
    runbook.blank();
    runbook.step(format!(
        "Submit the prepared experiment: fex run -f {} \
         (the generated credentials are already embedded)",
        output_directory.join(EXPERIMENT_FILE_NAME).display()
    ));
    runbook.blank();
    if options.use_local_data {
        runbook.step(format!(
            "Collect the result files from {} once the task has finished",
            result_dir.display()
        ));
    } else {
        runbook.step(
            "Collect the result files from the endpoints configured in the result file connectors",
        );
    }
    runbook.blank();
    runbook
}
