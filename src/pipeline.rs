use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::checker_cms::{check_cms_login, CmsTarget, HttpLoginClient, LoginClient};
use crate::checker_dns::{check_bind_binary, check_bind_service, check_forward_dns, check_reverse_dns};
use crate::checker_mysql::{
    check_app_connection, check_database_exists, check_database_user_exists, check_mysql_binary,
    check_mysql_service, MysqlAdmin, DEFAULT_ADMIN_USER,
};
use crate::checker_php::{check_php_binary, check_php_modules, expected_modules};
use crate::checker_vm::{check_vm_resources, check_vm_status, find_vm, locate_vm, VmLocation};
use crate::checker_web::{check_nginx_binary, check_nginx_config_syntax, check_nginx_service};
use crate::config::GraderConfig;
use crate::error::SpecError;
use crate::formatter::{format_result, DEFAULT_MAX_SCORE};
use crate::models::{HostCredential, PipelineEvent, TestSpec, DEFAULT_SSH_PORT};
use crate::scoring::ScoreAccumulator;
use crate::ssh_client::{RemoteShell, ShellConnector, SshConnector};
use crate::task_helpers::EventSink;
use crate::task_types::{
    Cancelled, ShellSlot, StageOutcome, StageResult, VmStage, CANCELLED_REASON, PROXMOX_STAGE,
    UBUNTU_STAGE,
};
use crate::utils::probe_error;

pub const EXISTENCE_SCORE: u32 = 10;
pub const DB_CONNECTION_SCORE: u32 = 10;
pub const CMS_LOGIN_SCORE: u32 = 15;
pub const DEFAULT_VM_STATUS: &str = "running";

type ShellProbe = fn(&mut dyn RemoteShell) -> Value;
type Stage = fn(&mut Pipeline, &EventSink) -> StageResult;

/// One grading attempt: walks the stages in order against the hosts named by
/// the test spec and reports every check through an [`EventSink`].
///
/// All I/O is blocking; run it on a worker thread (see `task_worker`).
pub struct Pipeline {
    spec: TestSpec,
    nodes: Vec<HostCredential>,
    connector: Arc<dyn ShellConnector>,
    login_client: Arc<dyn LoginClient>,
    scores: ScoreAccumulator,
    node_shell: Option<Box<dyn RemoteShell>>,
    proxmox_shell: Option<Box<dyn RemoteShell>>,
    ubuntu_shell: Option<Box<dyn RemoteShell>>,
}

impl Pipeline {
    pub fn new(
        spec: TestSpec,
        nodes: Vec<HostCredential>,
        connector: Arc<dyn ShellConnector>,
        login_client: Arc<dyn LoginClient>,
    ) -> Self {
        Self {
            spec,
            nodes,
            connector,
            login_client,
            scores: ScoreAccumulator::new(),
            node_shell: None,
            proxmox_shell: None,
            ubuntu_shell: None,
        }
    }

    /// Pipeline backed by real SSH sessions and HTTP.
    pub fn with_config(spec: TestSpec, nodes: Vec<HostCredential>, config: &GraderConfig) -> Self {
        Self::new(
            spec,
            nodes,
            Arc::new(SshConnector::new(config.connect_timeout())),
            Arc::new(HttpLoginClient::new(config.http_timeout())),
        )
    }

    /// Runs to completion, cancellation or the first fatal stage. Always ends
    /// with exactly one terminal event and with every session closed.
    pub fn run(mut self, sink: &EventSink) {
        info!(nodes = self.nodes.len(), "grading run started");
        if !sink.emit(PipelineEvent::Start) {
            return;
        }

        let outcome = self.run_stages(sink);
        self.close_sessions();

        let terminal = match outcome {
            Ok(StageOutcome::Continue) => {
                let summary = self.scores.summary();
                info!(
                    total = summary.total,
                    max = summary.max,
                    grade = summary.grade.as_str(),
                    "grading run finished"
                );
                PipelineEvent::Finished(summary)
            }
            Ok(StageOutcome::Fatal(reason)) => {
                warn!(%reason, "grading run stopped");
                PipelineEvent::Stopped(Some(reason))
            }
            Err(Cancelled) => {
                info!("grading run cancelled");
                PipelineEvent::Stopped(Some(CANCELLED_REASON.to_string()))
            }
        };
        sink.emit(terminal);
    }

    fn run_stages(&mut self, sink: &EventSink) -> StageResult {
        if sink.is_cancelled() {
            return Err(Cancelled);
        }

        let stages: [(&str, Stage); 9] = [
            ("proxmox discovery", Self::proxmox_discovery),
            ("proxmox access", Self::proxmox_access),
            ("ubuntu discovery", Self::ubuntu_discovery),
            ("ubuntu access", Self::ubuntu_access),
            ("php", Self::php_stage),
            ("web", Self::web_stage),
            ("database", Self::database_stage),
            ("cms", Self::cms_stage),
            ("dns", Self::dns_stage),
        ];
        for (name, stage) in stages {
            info!(stage = name, "stage started");
            if let StageOutcome::Fatal(reason) = stage(self, sink)? {
                return Ok(StageOutcome::Fatal(reason));
            }
        }
        Ok(StageOutcome::Continue)
    }

    /// Scores `raw`, streams it, then honours a pending cancellation.
    fn record(
        &mut self,
        sink: &EventSink,
        category: &str,
        step_code: &str,
        step_name: &str,
        raw: Value,
        max_score: u32,
    ) -> Result<(), Cancelled> {
        let result = format_result(category, step_code, step_name, raw, max_score);
        self.scores.add(&result);
        debug!(step_code, status = ?result.status, score = result.score, "check completed");

        if !sink.emit(PipelineEvent::CheckCompleted(result)) {
            return Err(Cancelled);
        }
        if sink.is_cancelled() {
            info!(step_code, "cancellation observed");
            return Err(Cancelled);
        }
        Ok(())
    }

    fn slot_mut(&mut self, slot: ShellSlot) -> &mut Option<Box<dyn RemoteShell>> {
        match slot {
            ShellSlot::Node => &mut self.node_shell,
            ShellSlot::Proxmox => &mut self.proxmox_shell,
            ShellSlot::Ubuntu => &mut self.ubuntu_shell,
        }
    }

    fn shell(&mut self, slot: ShellSlot) -> Option<&mut (dyn RemoteShell + 'static)> {
        self.slot_mut(slot).as_deref_mut()
    }

    fn close_shell(&mut self, slot: ShellSlot) {
        if let Some(mut shell) = self.slot_mut(slot).take() {
            shell.close();
            debug!(session = slot.label(), "session closed");
        }
    }

    fn close_sessions(&mut self) {
        for slot in [ShellSlot::Node, ShellSlot::Proxmox, ShellSlot::Ubuntu] {
            self.close_shell(slot);
        }
    }

    fn probe_on(
        &mut self,
        slot: ShellSlot,
        step: &str,
        probe: impl FnOnce(&mut dyn RemoteShell) -> Value,
    ) -> Value {
        match self.shell(slot) {
            Some(shell) => probe(shell),
            None => probe_error(step, format!("{} SSH session is not open", slot.label())),
        }
    }

    fn record_probes(
        &mut self,
        sink: &EventSink,
        category: &str,
        checks: &[(&str, &str, ShellProbe)],
    ) -> Result<(), Cancelled> {
        for (step_code, step_name, probe) in checks {
            let raw = self.probe_on(ShellSlot::Ubuntu, step_name, *probe);
            self.record(sink, category, step_code, step_name, raw, DEFAULT_MAX_SCORE)?;
        }
        Ok(())
    }

    fn proxmox_discovery(&mut self, sink: &EventSink) -> StageResult {
        let stage = PROXMOX_STAGE;
        let found = match self.spec.input_str(stage.spec_key, "name") {
            Ok(vm_name) => {
                let search = find_vm(self.connector.as_ref(), &self.nodes, &vm_name);
                match search.located {
                    Some(located) => Ok(located),
                    None => Err(not_found_message(&vm_name, &search.errors)),
                }
            }
            Err(error) => Err(error.to_string()),
        };

        match found {
            Ok(located) => {
                self.node_shell = Some(located.shell);
                self.vm_checks(sink, &stage, ShellSlot::Node, Some(located.host), located.location)?;
                self.close_shell(ShellSlot::Node);
                Ok(StageOutcome::Continue)
            }
            Err(message) => self.vm_missing(sink, &stage, message),
        }
    }

    /// The Ubuntu VM is looked up on the exam's own hypervisor.
    fn ubuntu_discovery(&mut self, sink: &EventSink) -> StageResult {
        let stage = UBUNTU_STAGE;
        let found = match self.spec.input_str(stage.spec_key, "name") {
            Err(error) => Err(error.to_string()),
            Ok(vm_name) => match self.shell(ShellSlot::Proxmox) {
                None => Err(format!("{} SSH session is not open", ShellSlot::Proxmox.label())),
                Some(shell) => match locate_vm(shell, &vm_name) {
                    Ok(Some(location)) => Ok(location),
                    Ok(None) => Err(not_found_message(&vm_name, &[])),
                    Err(error) => Err(error.to_string()),
                },
            },
        };

        match found {
            Ok(location) => {
                self.vm_checks(sink, &stage, ShellSlot::Proxmox, None, location)?;
                self.close_shell(ShellSlot::Proxmox);
                Ok(StageOutcome::Continue)
            }
            Err(message) => self.vm_missing(sink, &stage, message),
        }
    }

    fn vm_missing(&mut self, sink: &EventSink, stage: &VmStage, message: String) -> StageResult {
        let raw = json!({"status": false, "message": message});
        self.record(sink, stage.category, &stage.code("01"), stage.exists_name, raw, EXISTENCE_SCORE)?;
        Ok(StageOutcome::Fatal(stage.not_found_reason()))
    }

    /// Existence, per-resource and power-state checks of a located VM.
    fn vm_checks(
        &mut self,
        sink: &EventSink,
        stage: &VmStage,
        slot: ShellSlot,
        node: Option<String>,
        location: VmLocation,
    ) -> Result<(), Cancelled> {
        let mut raw = json!({
            "status": true,
            "hostname": location.hostname,
            "vmid": location.vmid,
        });
        if let Some(node) = node {
            raw["node"] = json!(node);
        }
        self.record(sink, stage.category, &stage.code("01"), stage.exists_name, raw, EXISTENCE_SCORE)?;

        let vmid = location.vmid;
        let expected = self.spec.expected_map(stage.spec_key, "resources");
        let outcomes = match self.shell(slot) {
            Some(shell) => check_vm_resources(shell, &vmid, &expected),
            None => expected
                .keys()
                .map(|key| {
                    let error = format!("{} SSH session is not open", slot.label());
                    (key.clone(), probe_error("Reading VM configuration", error))
                })
                .collect(),
        };
        for (key, raw) in outcomes {
            let step_name = format!("{} {key}", stage.resource_prefix);
            self.record(
                sink,
                stage.category,
                &stage.resource_code(&key),
                &step_name,
                raw,
                DEFAULT_MAX_SCORE,
            )?;
        }

        let expected_status = self
            .spec
            .expected(stage.spec_key, "vm_status")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|status| !status.is_empty())
            .unwrap_or(DEFAULT_VM_STATUS)
            .to_string();
        let raw = self.probe_on(slot, "Reading VM status", |shell| {
            check_vm_status(shell, &vmid, &expected_status)
        });
        self.record(sink, stage.category, &stage.code("02"), stage.running_name, raw, DEFAULT_MAX_SCORE)
    }

    fn proxmox_access(&mut self, sink: &EventSink) -> StageResult {
        self.vm_access(sink, &PROXMOX_STAGE, ShellSlot::Proxmox)
    }

    fn ubuntu_access(&mut self, sink: &EventSink) -> StageResult {
        self.vm_access(sink, &UBUNTU_STAGE, ShellSlot::Ubuntu)
    }

    /// Logs into the VM with the credentials from the test spec. The session stays
    /// open for the stages that follow; a refused login ends the run.
    fn vm_access(&mut self, sink: &EventSink, stage: &VmStage, slot: ShellSlot) -> StageResult {
        let step_code = stage.code("03");
        let connected = self.stage_credential(stage.spec_key).map_err(|error| error.to_string()).and_then(
            |credential| {
                self.connector
                    .connect(&credential)
                    .map(|shell| (credential.host, shell))
                    .map_err(|error| error.to_string())
            },
        );

        match connected {
            Ok((host, shell)) => {
                let raw = json!({
                    "status": true,
                    "host": host,
                    "fingerprint": shell.fingerprint(),
                    "message": Value::Null,
                });
                *self.slot_mut(slot) = Some(shell);
                self.record(sink, stage.category, &step_code, stage.access_name, raw, DEFAULT_MAX_SCORE)?;
                Ok(StageOutcome::Continue)
            }
            Err(message) => {
                warn!(session = slot.label(), %message, "ssh access failed");
                let raw = json!({"status": false, "message": message});
                self.record(sink, stage.category, &step_code, stage.access_name, raw, DEFAULT_MAX_SCORE)?;
                Ok(StageOutcome::Fatal(stage.access_failed_reason(&message)))
            }
        }
    }

    fn stage_credential(&self, stage: &str) -> Result<HostCredential, SpecError> {
        let port = self
            .spec
            .input(stage, "port")
            .and_then(Value::as_u64)
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_SSH_PORT);
        Ok(HostCredential {
            host: self.spec.input_str(stage, "host")?,
            username: self.spec.input_str_any(stage, &["user", "username"])?,
            password: self.spec.input_str(stage, "password")?,
            port,
        })
    }

    fn php_stage(&mut self, sink: &EventSink) -> StageResult {
        let raw = self.probe_on(ShellSlot::Ubuntu, "Checking PHP Binary", |shell| {
            check_php_binary(shell, "php")
        });
        self.record(sink, "php", "PHP-01", "Validate PHP Binary", raw, DEFAULT_MAX_SCORE)?;

        let modules = expected_modules(self.spec.expected("php", "modules"));
        let raw = self.probe_on(ShellSlot::Ubuntu, "Checking PHP Modules", |shell| {
            check_php_modules(shell, &modules)
        });
        self.record(sink, "php", "PHP-02", "Validate PHP Modules", raw, DEFAULT_MAX_SCORE)?;
        Ok(StageOutcome::Continue)
    }

    fn web_stage(&mut self, sink: &EventSink) -> StageResult {
        let checks: [(&str, &str, ShellProbe); 3] = [
            ("WEB-01", "Validate Nginx Binary", check_nginx_binary),
            ("WEB-02", "Validate Nginx Service", check_nginx_service),
            ("WEB-03", "Validate Nginx Config Syntax", check_nginx_config_syntax),
        ];
        self.record_probes(sink, "web", &checks)?;
        Ok(StageOutcome::Continue)
    }

    fn database_stage(&mut self, sink: &EventSink) -> StageResult {
        let checks: [(&str, &str, ShellProbe); 2] = [
            ("SQL-01", "Validate MySQL Binary", check_mysql_binary),
            ("SQL-02", "Validate MySQL Service", check_mysql_service),
        ];
        self.record_probes(sink, "mysql", &checks)?;

        let admin = MysqlAdmin {
            user: self
                .spec
                .optional_input_str("mysql", "admin_user")
                .unwrap_or_else(|| DEFAULT_ADMIN_USER.to_string()),
            password: self.spec.optional_input_str("mysql", "admin_password"),
        };
        let db_name = self.spec.input_str("mysql", "db_name");
        let db_user = self.spec.input_str("mysql", "db_user");
        let db_password = self.spec.input_str("mysql", "db_password");

        let step = "Checking Database Exists";
        let raw = match &db_name {
            Ok(name) => self.probe_on(ShellSlot::Ubuntu, step, |shell| {
                check_database_exists(shell, name, &admin)
            }),
            Err(error) => probe_error(step, error),
        };
        self.record(sink, "mysql", "SQL-03", "Validate Database Exists", raw, DEFAULT_MAX_SCORE)?;

        let step = "Checking Database User Exists";
        let raw = match &db_user {
            Ok(user) => self.probe_on(ShellSlot::Ubuntu, step, |shell| {
                check_database_user_exists(shell, user, &admin)
            }),
            Err(error) => probe_error(step, error),
        };
        self.record(sink, "mysql", "SQL-04", "Validate DB User Exists", raw, DEFAULT_MAX_SCORE)?;

        let step = "Checking Application Database Connection";
        let raw = match (&db_name, &db_user, &db_password) {
            (Ok(name), Ok(user), Ok(password)) => self.probe_on(ShellSlot::Ubuntu, step, |shell| {
                check_app_connection(shell, name, user, password)
            }),
            (Err(error), _, _) | (_, Err(error), _) | (_, _, Err(error)) => probe_error(step, error),
        };
        self.record(sink, "mysql", "SQL-05", "Validate DB Connection", raw, DB_CONNECTION_SCORE)?;
        Ok(StageOutcome::Continue)
    }

    fn cms_target(&self) -> Result<CmsTarget, SpecError> {
        Ok(CmsTarget {
            url: self.spec.input_str("wordpress", "url")?,
            username: self.spec.input_str_any("wordpress", &["username", "user"])?,
            password: self.spec.input_str("wordpress", "password")?,
        })
    }

    fn cms_stage(&mut self, sink: &EventSink) -> StageResult {
        let raw = match self.cms_target() {
            Ok(target) => check_cms_login(self.login_client.as_ref(), &target),
            Err(error) => probe_error("Checking CMS WordPress Login", error),
        };
        self.record(sink, "wordpress", "WP-01", "Validate WordPress Login", raw, CMS_LOGIN_SCORE)?;
        Ok(StageOutcome::Continue)
    }

    fn dns_stage(&mut self, sink: &EventSink) -> StageResult {
        let checks: [(&str, &str, ShellProbe); 2] = [
            ("DNS-01", "Validate BIND Binary", check_bind_binary),
            ("DNS-02", "Validate DNS Service", check_bind_service),
        ];
        self.record_probes(sink, "dns", &checks)?;

        let domain = self.spec.expected_str("dns", "domain");
        let ip = self.spec.expected_str("dns", "ip");

        let step = "Checking Forward DNS";
        let raw = match (&domain, &ip) {
            (Ok(domain), Ok(ip)) => self.probe_on(ShellSlot::Ubuntu, step, |shell| {
                check_forward_dns(shell, domain, ip)
            }),
            (Err(error), _) | (_, Err(error)) => probe_error(step, error),
        };
        self.record(sink, "dns", "DNS-03", "Validate Forward DNS", raw, DEFAULT_MAX_SCORE)?;

        let step = "Checking Reverse DNS";
        let raw = match (&domain, &ip) {
            (Ok(domain), Ok(ip)) => self.probe_on(ShellSlot::Ubuntu, step, |shell| {
                check_reverse_dns(shell, ip, domain)
            }),
            (Err(error), _) | (_, Err(error)) => probe_error(step, error),
        };
        self.record(sink, "dns", "DNS-04", "Validate Reverse DNS", raw, DEFAULT_MAX_SCORE)?;
        Ok(StageOutcome::Continue)
    }
}

fn not_found_message(vm_name: &str, node_errors: &[String]) -> String {
    if node_errors.is_empty() {
        format!("VM '{vm_name}' not found")
    } else {
        format!(
            "VM '{vm_name}' not found (unreachable nodes: {})",
            node_errors.join("; ")
        )
    }
}
