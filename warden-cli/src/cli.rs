//! Command-line definition.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::tracing_support::TracingFormat;

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Inspect roles and permissions of the records console", long_about = None)]
pub struct Cli {
    /// Roles file (default: <config_dir>/warden/roles.json)
    #[arg(long, global = true, env = "WARDEN_ROLES")]
    pub roles: Option<PathBuf>,

    /// Engine config file (JSON)
    #[arg(long, global = true, env = "WARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Refuse to modify the roles file
    #[arg(long, global = true)]
    pub read_only: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "compact")]
    pub log_format: TracingFormat,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage roles
    #[command(subcommand)]
    Roles(RolesCommand),

    /// Check a full permission string for a user
    Check {
        #[arg(long)]
        user: u64,

        /// e.g. `cases:update`
        permission: String,
    },

    /// Check module[:submodule][:action] for a user (module alone means read)
    Can {
        #[arg(long)]
        user: u64,

        module: String,
        submodule: Option<String>,
        action: Option<String>,
    },

    /// Show the navigation menu a user would see
    Menu {
        #[arg(long)]
        user: u64,
    },

    /// Show build information
    Version,
}

#[derive(Subcommand, Debug)]
pub enum RolesCommand {
    /// List all roles
    List,

    /// Show one role
    Show { name: String },

    /// Create a role
    Create(CreateRoleArgs),

    /// Update a role
    Update(UpdateRoleArgs),

    /// Delete a role that no user holds
    Delete { id: u64 },

    /// Write the built-in roles and users to the roles file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct CreateRoleArgs {
    /// Lowercase letters, digits and underscores
    pub name: String,

    #[arg(long)]
    pub display_name: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Permission to grant (repeatable)
    #[arg(long = "permission", short = 'p')]
    pub permissions: Vec<String>,

    /// Grant every catalog permission of a module (repeatable)
    #[arg(long = "grant-module")]
    pub grant_modules: Vec<String>,
}

#[derive(Args, Debug)]
pub struct UpdateRoleArgs {
    pub id: u64,

    /// Rename the role
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub display_name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Replace the permission list (repeatable)
    #[arg(long = "permission", short = 'p')]
    pub permissions: Vec<String>,

    /// Grant every catalog permission of a module (repeatable)
    #[arg(long = "grant-module")]
    pub grant_modules: Vec<String>,

    /// Remove every permission of a module (repeatable)
    #[arg(long = "revoke-module")]
    pub revoke_modules: Vec<String>,
}

impl UpdateRoleArgs {
    /// Whether any permission edit was requested
    pub fn edits_permissions(&self) -> bool {
        !self.permissions.is_empty()
            || !self.grant_modules.is_empty()
            || !self.revoke_modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_can() {
        let cli = Cli::try_parse_from(["warden", "can", "--user", "4", "personnel", "read", "self"])
            .unwrap();
        match cli.command {
            Command::Can {
                user,
                module,
                submodule,
                action,
            } => {
                assert_eq!(user, 4);
                assert_eq!(module, "personnel");
                assert_eq!(submodule.as_deref(), Some("read"));
                assert_eq!(action.as_deref(), Some("self"));
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "warden", "roles", "list", "--json", "--roles", "/tmp/roles.json", "-vv",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.roles, Some(PathBuf::from("/tmp/roles.json")));
        assert!(matches!(cli.command, Command::Roles(RolesCommand::List)));
    }

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "warden",
            "roles",
            "create",
            "clerk",
            "--display-name",
            "Clerk",
            "-p",
            "reports:read",
            "--grant-module",
            "cases",
        ])
        .unwrap();
        match cli.command {
            Command::Roles(RolesCommand::Create(args)) => {
                assert_eq!(args.name, "clerk");
                assert_eq!(args.permissions, vec!["reports:read"]);
                assert_eq!(args.grant_modules, vec!["cases"]);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }
}
