//! Shared VM definition rendering for the provisioning bundles.

pub const VM_BOX: &str = "trusty64";
pub const VM_BOX_URL: &str =
    "https://cloud-images.ubuntu.com/xenial/current/xenial-server-cloudimg-amd64-vagrant.box";
pub const VM_USER: &str = "ubuntu";
pub const DEFAULT_VM_MEMORY_MB: u64 = 4096;
pub const DEFAULT_VM_CPUS: u64 = 2;

pub const VAGRANT_FILE_NAME: &str = "Vagrantfile";
pub const PROVISION_FILE_NAME: &str = "provision.sh";

pub struct VmDefinition {
    pub memory_mb: u64,
    pub cpus: u64,
    /// (guest, host) forwarding, when the VM exposes a service port.
    pub forwarded_port: Option<(u16, u16)>,
    pub provision_script: &'static str,
}

pub fn render_vagrantfile(vm: &VmDefinition) -> String {
    let mut lines = vec![
        "VAGRANTFILE_API_VERSION = \"2\"".to_string(),
        String::new(),
        "Vagrant.configure(VAGRANTFILE_API_VERSION) do |config|".to_string(),
        format!("    config.vm.box = \"{}\"", VM_BOX),
        format!("    config.vm.box_url = \"{}\"", VM_BOX_URL),
    ];
    if let Some((guest, host)) = vm.forwarded_port {
        lines.push(format!(
            "    config.vm.network :forwarded_port, guest: {}, host: {}",
            guest, host
        ));
    }
    lines.extend([
        String::new(),
        "    config.vm.provider \"virtualbox\" do |v|".to_string(),
        format!("        v.memory = {}", vm.memory_mb),
        format!(
            "        v.customize [\"modifyvm\", :id, \"--cpus\", \"{}\"]",
            vm.cpus
        ),
        "    end".to_string(),
        String::new(),
        format!(
            "    config.vm.provision \"shell\", path: \"{}\"",
            vm.provision_script
        ),
        "end".to_string(),
        String::new(),
    ]);
    lines.join("\n")
}
