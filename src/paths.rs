/// Parent of every provisioned home directory
pub const HOME_ROOT: &str = "/home";

/// Directory moved from the invoking user's home into the new one
pub const HOMELAB_DIR: &str = "homelab";

/// Per-user config directory created after relocation
pub const CONFIG_DIR: &str = ".config";

/// Login shell for the provisioned account
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Main sshd configuration
pub const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";

/// Directory sshd includes drop-in snippets from
pub const SSHD_DROP_IN_DIR: &str = "/etc/ssh/sshd_config.d";

/// File name of the managed drop-in snippet
pub const SSHD_DROP_IN_NAME: &str = "10-homelab.conf";

/// Environment variable consulted when no username is given
pub const USERNAME_ENV: &str = "username";
