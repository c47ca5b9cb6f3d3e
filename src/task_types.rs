pub const CANCELLED_REASON: &str = "cancelled by user";

/// How a stage hands control back to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Continue,
    Fatal(String),
}

/// The cancel flag was raised, or nobody is listening any more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

pub type StageResult = Result<StageOutcome, Cancelled>;

/// Identifies the session a probe runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellSlot {
    /// Hypervisor node on which the exam VM was discovered.
    Node,
    /// The exam's own hypervisor, reached with its spec credentials.
    Proxmox,
    Ubuntu,
}

impl ShellSlot {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Node => "hypervisor node",
            Self::Proxmox => "Proxmox",
            Self::Ubuntu => "Ubuntu",
        }
    }
}

/// Names and codes that differ between the two VM stages.
#[derive(Debug, Clone, Copy)]
pub struct VmStage {
    pub spec_key: &'static str,
    pub category: &'static str,
    pub code_prefix: &'static str,
    pub title: &'static str,
    pub exists_name: &'static str,
    pub resource_prefix: &'static str,
    pub running_name: &'static str,
    pub access_name: &'static str,
}

pub const PROXMOX_STAGE: VmStage = VmStage {
    spec_key: "vm_proxmox",
    category: "proxmox",
    code_prefix: "PVE",
    title: "Proxmox",
    exists_name: "Validate VM Exists",
    resource_prefix: "Validate Resource",
    running_name: "Validate VM Running",
    access_name: "Validate Proxmox SSH Access",
};

pub const UBUNTU_STAGE: VmStage = VmStage {
    spec_key: "vm_ubuntu",
    category: "ubuntu",
    code_prefix: "UBU",
    title: "Ubuntu",
    exists_name: "Validate Ubuntu VM Exists",
    resource_prefix: "Validate Ubuntu Resource",
    running_name: "Validate Ubuntu Running",
    access_name: "Validate Ubuntu SSH Access",
};

impl VmStage {
    pub fn code(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.code_prefix)
    }

    pub fn resource_code(&self, key: &str) -> String {
        format!("{}-RES-{}", self.code_prefix, key.to_uppercase())
    }

    pub fn not_found_reason(&self) -> String {
        format!("{} VM not found. Cannot continue tests.", self.title)
    }

    pub fn access_failed_reason(&self, error: &str) -> String {
        format!("{} SSH access failed. Test stopped. Error: {error}", self.title)
    }
}
