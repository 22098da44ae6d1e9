//! Labels, annotations and secret names shared between the controller and
//! the node configurator.

/// Label identifying Windows Machines
pub const MACHINE_OS_LABEL: &str = "machine.openshift.io/os-id";
/// Value of [`MACHINE_OS_LABEL`] on Windows Machines
pub const WINDOWS_MACHINE_OS: &str = "Windows";
/// Label selector for Windows Machines
pub const WINDOWS_MACHINE_SELECTOR: &str = "machine.openshift.io/os-id=Windows";

/// Stable OS label set by the kubelet on every Node
pub const NODE_OS_LABEL: &str = "kubernetes.io/os";
/// Value of [`NODE_OS_LABEL`] on Windows Nodes
pub const WINDOWS_NODE_OS: &str = "windows";
/// Label selector for Windows Nodes
pub const WINDOWS_NODE_SELECTOR: &str = "kubernetes.io/os=windows";

/// Operator build that last configured the Node
pub const VERSION_ANNOTATION: &str = "windowsmachineconfig.openshift.io/version";
/// SHA-256 of the public key used to configure the Node
pub const PUB_KEY_HASH_ANNOTATION: &str = "windowsmachineconfig.openshift.io/pub-key-hash";

/// Secret holding the private key used to reach Windows instances
pub const PRIVATE_KEY_SECRET: &str = "cloud-private-key";
pub const PRIVATE_KEY_SECRET_KEY: &str = "private-key.pem";

/// Secret holding the userData bootstrap payload, in the machine-api namespace
pub const USER_DATA_SECRET: &str = "windows-user-data";
pub const USER_DATA_SECRET_KEY: &str = "userData";

/// Endpoints object the cluster monitoring stack scrapes Windows nodes through
pub const WINDOWS_METRICS_ENDPOINTS: &str = "windows-exporter";
/// Port the windows_exporter listens on
pub const WINDOWS_METRICS_PORT: i32 = 9182;
