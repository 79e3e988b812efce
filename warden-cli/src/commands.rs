//! Command handlers
//!
//! Each handler opens the roles file through the engine, performs one
//! operation, and renders the result as text or JSON.

use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

use warden_api::catalog::{grant_module, revoke_module};
use warden_engine::{
    console_menu, visible_items, CurrentUser, EngineConfig, FileRoleStore, LoadError, NavItem,
    Permission, PermissionService, PermissionServiceBuilder, PermissionSet, Role, RoleDocument,
    RoleDraft, RoleId, RoleName, RoleStore, RoleUpdate, SessionAuth, User, UserId,
};

use crate::build_info::{version_info, BuildInfo};
use crate::cli::{Cli, Command, CreateRoleArgs, RolesCommand, UpdateRoleArgs};
use crate::{CliError, CliResult, Response, UserError};

/// Run a parsed command line
pub async fn run(cli: Cli) -> CliResult<Response> {
    let config = resolve_config(&cli)?;
    let json = cli.json;

    match cli.command {
        Command::Version => {
            if json {
                Response::json(&BuildInfo::current())
            } else {
                Ok(Response::text(version_info()))
            }
        }
        Command::Roles(RolesCommand::Init { force }) => init_roles(&config, force, json),
        command => {
            let ctx = Context::open(config, json)?;
            match command {
                Command::Roles(RolesCommand::List) => ctx.list_roles().await,
                Command::Roles(RolesCommand::Show { name }) => ctx.show_role(&name).await,
                Command::Roles(RolesCommand::Create(args)) => ctx.create_role(args).await,
                Command::Roles(RolesCommand::Update(args)) => ctx.update_role(args).await,
                Command::Roles(RolesCommand::Delete { id }) => ctx.delete_role(RoleId(id)).await,
                Command::Check { user, permission } => ctx.check(UserId(user), &permission).await,
                Command::Can {
                    user,
                    module,
                    submodule,
                    action,
                } => {
                    ctx.can(
                        UserId(user),
                        &module,
                        submodule.as_deref(),
                        action.as_deref(),
                    )
                    .await
                }
                Command::Menu { user } => ctx.menu(UserId(user)).await,
                Command::Version | Command::Roles(RolesCommand::Init { .. }) => {
                    Err(CliError::system("Command handled before opening the roles file"))
                }
            }
        }
    }
}

/// Config file (if any) with command-line overrides applied
fn resolve_config(cli: &Cli) -> CliResult<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(roles) = &cli.roles {
        config.roles_file = Some(roles.clone());
    }
    config.read_only |= cli.read_only;
    Ok(config)
}

fn init_roles(config: &EngineConfig, force: bool, json: bool) -> CliResult<Response> {
    let path = config.roles_path();
    if config.read_only {
        return Err(CliError::User(UserError::Rejected {
            reason: "The roles file is read-only".into(),
            fix_hint: "Drop --read-only (or `read_only` in the config) to initialize it".into(),
        }));
    }
    if path.exists() && !force {
        return Err(CliError::User(UserError::Rejected {
            reason: format!("{} already exists", path.display()),
            fix_hint: "Pass --force to overwrite it with the built-in roles".into(),
        }));
    }

    let document = RoleDocument::seeded();
    let (roles, users) = (document.roles.len(), document.users.len());
    FileRoleStore::initialize(&path, document)?;
    tracing::info!(path = %path.display(), roles, users, "Initialized roles file");

    if json {
        Response::json(&serde_json::json!({
            "path": path,
            "roles": roles,
            "users": users,
        }))
    } else {
        Ok(Response::text(format!(
            "Wrote {} roles and {} users to {}",
            roles,
            users,
            path.display()
        )))
    }
}

/// An opened roles file plus a service acting on it
struct Context {
    store: Arc<FileRoleStore>,
    auth: Arc<SessionAuth>,
    service: PermissionService,
    json: bool,
}

#[derive(Serialize)]
struct DecisionReport<'a> {
    user: UserId,
    role: Option<&'a str>,
    permission: String,
    allowed: bool,
}

impl Context {
    fn open(config: EngineConfig, json: bool) -> CliResult<Self> {
        let store = Arc::new(FileRoleStore::new(config.roles_path())?);
        let auth = Arc::new(SessionAuth::new());
        let service = PermissionServiceBuilder::new()
            .config(config)
            .store(store.clone())
            .auth(auth.clone())
            .build()?;
        tracing::debug!(path = %store.path().display(), "Opened roles file");
        Ok(Self {
            store,
            auth,
            service,
            json,
        })
    }

    async fn list_roles(&self) -> CliResult<Response> {
        let roles = self.service.list_roles().await?;
        if self.json {
            return Response::json(&roles);
        }

        let mut out = String::new();
        let _ = writeln!(out, "{:<4} {:<26} {:<32} PERMISSIONS", "ID", "NAME", "DISPLAY NAME");
        for role in &roles {
            let count = if role.permissions.contains_wildcard() {
                "all".to_string()
            } else {
                role.permissions.len().to_string()
            };
            let _ = writeln!(
                out,
                "{:<4} {:<26} {:<32} {}",
                role.id.0,
                role.name.as_str(),
                role.display_name,
                count
            );
        }
        Ok(Response::text(out.trim_end().to_string()))
    }

    async fn show_role(&self, name: &str) -> CliResult<Response> {
        let role = self
            .service
            .find_role(name)
            .await?
            .ok_or_else(|| not_found(format!("Role '{}'", name)))?;
        let users = self.store.users_with_role(&role.name).await?;

        if self.json {
            return Response::json(&serde_json::json!({
                "role": role,
                "users": users,
            }));
        }
        Ok(Response::text(describe_role(&role, users.len())))
    }

    async fn create_role(&self, args: CreateRoleArgs) -> CliResult<Response> {
        let mut permissions = PermissionSet::parse(&args.permissions)?;
        for module in &args.grant_modules {
            grant_module(&mut permissions, module)?;
        }
        let draft = RoleDraft::new(&args.name, args.display_name)?
            .description(args.description)
            .permissions(permissions);

        let role = self.service.create_role(draft).await?;
        self.render_role(&role, format!("Created role {} (id {})", role.name, role.id))
    }

    async fn update_role(&self, args: UpdateRoleArgs) -> CliResult<Response> {
        let id = RoleId(args.id);
        let mut update = RoleUpdate::new();

        if args.edits_permissions() {
            let current = self
                .service
                .registry()
                .find_role_by_id(id)
                .await?
                .ok_or_else(|| not_found(format!("Role {}", id)))?;
            let mut permissions = if args.permissions.is_empty() {
                current.permissions
            } else {
                PermissionSet::parse(&args.permissions)?
            };
            for module in &args.revoke_modules {
                revoke_module(&mut permissions, module);
            }
            for module in &args.grant_modules {
                grant_module(&mut permissions, module)?;
            }
            update = update.permissions(permissions);
        }
        if let Some(name) = &args.name {
            update = update.name(RoleName::new(name.as_str())?);
        }
        if let Some(display_name) = args.display_name {
            update = update.display_name(display_name);
        }
        if let Some(description) = args.description {
            update = update.description(description);
        }
        if update.is_empty() {
            return Err(CliError::User(UserError::InvalidArgument {
                arg: "update".into(),
                reason: "Nothing to change; pass --name, --display-name, --description or a permission flag".into(),
            }));
        }

        let role = self.service.update_role(id, update).await?;
        self.render_role(&role, format!("Updated role {} (id {})", role.name, role.id))
    }

    async fn delete_role(&self, id: RoleId) -> CliResult<Response> {
        let role = self.service.delete_role(id).await?;
        self.render_role(&role, format!("Deleted role {} (id {})", role.name, role.id))
    }

    async fn check(&self, user: UserId, permission: &str) -> CliResult<Response> {
        Permission::parse(permission).map_err(|e| {
            CliError::User(UserError::InvalidArgument {
                arg: permission.to_string(),
                reason: e.to_string(),
            })
        })?;
        let user = self.sign_in(user).await?;
        let allowed = self.service.can_do(permission);
        self.render_decision(&user, permission.to_string(), allowed)
    }

    async fn can(
        &self,
        user: UserId,
        module: &str,
        submodule: Option<&str>,
        action: Option<&str>,
    ) -> CliResult<Response> {
        let user = self.sign_in(user).await?;
        let allowed = self.service.can(module, submodule, action);
        let asked = [Some(module), submodule, action]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(":");
        self.render_decision(&user, asked, allowed)
    }

    async fn menu(&self, user: UserId) -> CliResult<Response> {
        self.sign_in(user).await?;
        let items = visible_items(&self.service, &console_menu());
        if self.json {
            return Response::json(&items);
        }
        let mut out = String::new();
        render_menu(&mut out, &items, 0);
        Ok(Response::text(out.trim_end().to_string()))
    }

    /// Log the user in and resolve their permissions
    ///
    /// A user whose role cannot be resolved stays signed in with nothing
    /// granted, so checks answer "denied" rather than failing.
    async fn sign_in(&self, id: UserId) -> CliResult<User> {
        let user = self
            .store
            .find_user(id)
            .await?
            .ok_or_else(|| not_found(format!("User {}", id)))?;

        self.auth.login(CurrentUser::from(&user));
        match self.service.load_user_permissions(user.id).await {
            Ok(resolved) => {
                tracing::debug!(user = %user.id, role = %resolved.role, "Permissions resolved");
            }
            Err(LoadError::Registry(e)) => return Err(e.into()),
            Err(e) => tracing::warn!(user = %user.id, error = %e, "No permissions granted"),
        }
        Ok(user)
    }

    fn render_role(&self, role: &Role, summary: String) -> CliResult<Response> {
        if self.json {
            Response::json(role)
        } else {
            Ok(Response::text(summary))
        }
    }

    fn render_decision(&self, user: &User, permission: String, allowed: bool) -> CliResult<Response> {
        let mut response = if self.json {
            Response::json(&DecisionReport {
                user: user.id,
                role: user.role.as_deref(),
                permission,
                allowed,
            })?
        } else {
            Response::decision(allowed)
        };
        response.exit_code = if allowed { 0 } else { 1 };
        Ok(response)
    }
}

fn not_found(what: String) -> CliError {
    CliError::User(UserError::NotFound { what })
}

fn describe_role(role: &Role, users: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", role.display_name, role.name);
    let _ = writeln!(out, "Id:          {}", role.id);
    if !role.description.is_empty() {
        let _ = writeln!(out, "Description: {}", role.description);
    }
    let _ = writeln!(out, "Users:       {}", users);
    let _ = writeln!(out, "Permissions:");
    if role.permissions.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for permission in role.permissions.iter() {
        let _ = writeln!(out, "  {}", permission);
    }
    out.trim_end().to_string()
}

fn render_menu(out: &mut String, items: &[NavItem], depth: usize) {
    for item in items {
        let indent = "  ".repeat(depth);
        let _ = writeln!(out, "{}{:<28} {}", indent, item.label, item.path);
        render_menu(out, &item.children, depth + 1);
    }
}
