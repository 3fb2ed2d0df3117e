//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Beacon Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[store]
# sessions_path = "sessions"   # one child per session record
# presence_path = "presence"   # one `true` flag per online user
# users_path = "users"         # holds users/<uid>/current_session
# detection_delay_ms = 0       # 0-120000, in-memory store only

[tracker]
# command_buffer = 32          # 1-4096
# event_capacity = 256         # 1-65536

[logging]
# level = "info"               # trace, debug, info, warn, error
# filter = "beacon=debug"      # full EnvFilter directive, overrides level
"##
    .to_string()
}
