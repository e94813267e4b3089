//! Builder for configuring which runtime subsystems are available.

use crate::runtime::Runtime;

/// Configures and constructs a [`Runtime`].
///
/// The networking and filesystem subsystems are opt-in; resource
/// constructors panic with a pointer back here when their subsystem was not
/// enabled.
///
/// ```no_run
/// use culvert::RuntimeBuilder;
///
/// let mut runtime = RuntimeBuilder::new().enable_net().build();
/// runtime.block_on(async {
///     // TcpSocket, UdpSocket, ... are available here.
/// });
/// ```
#[derive(Default)]
pub struct RuntimeBuilder {
    net_enabled: bool,
    fs_enabled: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows sockets and the protocol clients built on them.
    pub fn enable_net(mut self) -> Self {
        self.net_enabled = true;
        self
    }

    /// Allows asynchronous file I/O.
    pub fn enable_fs(mut self) -> Self {
        self.fs_enabled = true;
        self
    }

    pub fn build(self) -> Runtime {
        Runtime::with_features(self.net_enabled, self.fs_enabled)
    }
}
