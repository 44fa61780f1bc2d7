//! Command handlers for the certdash CLI.
//!
//! `App` owns the loaded configuration and the API client. Construction runs
//! the session startup flow, so every command sees either a restored
//! authenticated session or an anonymous one.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use certdash_core::api::{ApiClient, ApiError, LogoUpload};
use certdash_core::config::SelectedOrganization;
use certdash_core::models::{
    CreateInviteRequest, CreateOrganizationRequest, Gender, OrganizationInvite, OrganizationRole,
    RegisterRequest, UpdateProfileRequest,
};
use certdash_core::utils::{format_date, format_optional, truncate_string};
use certdash_core::{Config, PageState, PaginationOptions, Paginator};
use tracing::{debug, info, warn};

/// Rows per page for list commands
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Column width for names in list output
const NAME_WIDTH: usize = 28;

pub struct App {
    config: Config,
    api: ApiClient,
}

impl App {
    /// Load configuration, build the client and restore any saved session
    pub async fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        let api = ApiClient::from_config(&config)?;

        let authenticated = api.session().on_startup(&api).await;
        debug!(authenticated, "Startup session check complete");

        Ok(Self { config, api })
    }

    fn save_config(&self) {
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    fn require_session(&self) -> Result<()> {
        if !self.api.session().is_authenticated() {
            bail!("Session expired, please log in again");
        }
        Ok(())
    }

    fn selected_organization(&self) -> Result<&SelectedOrganization> {
        self.config
            .selected_organization
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No organization selected. Run `certdash use <id>` first."))
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login(&mut self, email: Option<String>) -> Result<()> {
        let email = choose_email(email, self.config.last_email.clone(), prompt)?;
        if email.is_empty() {
            bail!("Email and password required");
        }
        let password = rpassword::prompt_password("Password: ")?;
        if password.is_empty() {
            bail!("Email and password required");
        }

        let identity = self.api.login(&email, &password).await.map_err(|e| {
            if e.is_unauthorized() {
                anyhow::anyhow!("Login failed: {}", e.user_message())
            } else {
                anyhow::Error::new(e).context("Login failed")
            }
        })?;

        self.config.last_email = Some(email);
        self.save_config();

        println!("Logged in as {} <{}>", identity.name, identity.email);
        Ok(())
    }

    pub async fn logout(&mut self) -> Result<()> {
        self.api.logout().await;
        self.config.selected_organization = None;
        self.save_config();
        println!("Logged out.");
        Ok(())
    }

    pub async fn register(&self) -> Result<()> {
        let email = prompt("Email: ")?;
        let name = prompt("Full name: ")?;
        let phone_number = prompt("Phone number: ")?;
        let address = prompt("Address: ")?;
        let dob = prompt("Date of birth (YYYY-MM-DD): ")?;
        let gender = prompt_gender()?;
        let password = rpassword::prompt_password("Password: ")?;
        let confirm = rpassword::prompt_password("Confirm password: ")?;
        if password != confirm {
            bail!("Passwords do not match");
        }

        let request = RegisterRequest {
            email,
            name,
            phone_number,
            address,
            dob,
            gender,
            password,
        };
        self.api.register(&request).await?;
        println!("Account created. Run `certdash login` to sign in.");
        Ok(())
    }

    pub fn whoami(&self) -> Result<()> {
        let session = self.api.session().snapshot();
        if !session.is_authenticated() {
            println!("Not logged in.");
            return Ok(());
        }
        println!(
            "[{}] {} <{}>",
            session.initials(),
            session.name().unwrap_or_default(),
            session.email().unwrap_or_default()
        );
        if let Some(avatar) = session.avatar_url() {
            println!("Avatar: {}", avatar);
        }
        if let Some(ref org) = self.config.selected_organization {
            println!("Organization: {} ({}) as {}", org.name, org.code, org.role);
        }
        Ok(())
    }

    // =========================================================================
    // Profile
    // =========================================================================

    pub async fn profile(&self, edit: bool) -> Result<()> {
        self.require_session()?;
        let profile = self.api.fetch_profile().await?;

        println!("Name:          {}", profile.name);
        println!("Phone:         {}", format_optional(&profile.phone_number, "-"));
        println!("Address:       {}", format_optional(&profile.address, "-"));
        println!("Date of birth: {}", format_optional(&profile.dob, "-"));
        println!(
            "Gender:        {}",
            profile.gender.map(|g| g.to_string()).unwrap_or_else(|| "-".to_string())
        );

        if !edit {
            return Ok(());
        }

        println!("\nPress Enter to keep the current value.");
        let keep = |input: String, current: Option<String>| {
            if input.is_empty() {
                current.unwrap_or_default()
            } else {
                input
            }
        };
        let request = UpdateProfileRequest {
            name: keep(prompt("Name: ")?, Some(profile.name.clone())),
            phone_number: keep(prompt("Phone: ")?, profile.phone_number.clone()),
            address: keep(prompt("Address: ")?, profile.address.clone()),
            dob: keep(prompt("Date of birth (YYYY-MM-DD): ")?, profile.dob.clone()),
            gender: match profile.gender {
                Some(current) => {
                    let input = prompt(&format!("Gender (male/female/other) [{}]: ", current))?;
                    if input.is_empty() {
                        current
                    } else {
                        Gender::from_str(&input).context("Unknown gender")?
                    }
                }
                None => prompt_gender()?,
            },
        };
        self.api.update_profile(&request).await?;
        self.api.reload_identity().await?;
        println!("Profile updated.");
        Ok(())
    }

    // =========================================================================
    // Organizations
    // =========================================================================

    pub async fn organizations(&self, page: u32, size: Option<u32>) -> Result<()> {
        self.require_session()?;
        let api = self.api.clone();
        let paginator = Paginator::from_fn(
            move |page, size| {
                let api = api.clone();
                async move { api.fetch_organizations(page, size).await }
            },
            options(page, size, true),
        );
        let state = settled(&paginator).await?;

        if state.data.is_empty() {
            println!("You are not a member of any organization yet.");
            return Ok(());
        }
        let selected = self.config.selected_organization.as_ref().map(|o| o.id);
        for org in &state.data {
            let marker = if Some(org.id) == selected { "*" } else { " " };
            println!(
                "{} {:>6}  {:<width$}  {:<10}  {}",
                marker,
                org.id,
                truncate_string(&org.name, NAME_WIDTH),
                org.code,
                org.role,
                width = NAME_WIDTH
            );
        }
        print_page_footer(&state);
        Ok(())
    }

    pub async fn organization(&self, id: Option<i64>) -> Result<()> {
        self.require_session()?;
        let id = match id {
            Some(id) => id,
            None => self.selected_organization()?.id,
        };
        let org = self.api.fetch_organization(id).await?;

        println!("{} ({})", org.name, org.code);
        println!("Domain:         {}", format_optional(&org.domain, "-"));
        println!("Description:    {}", format_optional(&org.description, "-"));
        println!("Legal name:     {}", format_optional(&org.legal_name, "-"));
        println!("Tax code:       {}", format_optional(&org.tax_code, "-"));
        println!("Legal address:  {}", format_optional(&org.legal_address, "-"));
        println!("Representative: {}", format_optional(&org.representative_name, "-"));
        println!(
            "Contact:        {} <{}> {}",
            format_optional(&org.contact_name, "-"),
            format_optional(&org.contact_email, "-"),
            format_optional(&org.contact_phone, "")
        );
        if let Some(plan) = org.service_plan {
            println!("Plan:           {:?}", plan);
        }
        Ok(())
    }

    /// Remember an organization for organization-scoped commands
    pub async fn use_organization(&mut self, id: i64) -> Result<()> {
        self.require_session()?;
        let organizations = self.api.fetch_organizations_brief().await?;
        let org = organizations
            .iter()
            .find(|o| o.id == id)
            .ok_or_else(|| anyhow::anyhow!("You are not a member of organization {}", id))?;

        self.config.selected_organization = Some(SelectedOrganization::from(org));
        self.save_config();
        info!(organization_id = id, "Organization selected");
        println!("Using {} ({}) as {}", org.name, org.code, org.role);
        Ok(())
    }

    pub async fn create_organization(&self, logo_path: &str) -> Result<()> {
        self.require_session()?;
        let bytes = std::fs::read(logo_path)
            .with_context(|| format!("Failed to read logo file {}", logo_path))?;
        let file_name = std::path::Path::new(logo_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("logo")
            .to_string();

        let optional = |input: String| (!input.is_empty()).then_some(input);
        let request = CreateOrganizationRequest {
            name: prompt("Name: ")?,
            code: prompt("Code: ")?,
            domain: optional(prompt("Domain (optional): ")?),
            logo_url: None,
            description: optional(prompt("Description (optional): ")?),
            legal_name: prompt("Legal name: ")?,
            tax_code: prompt("Tax code: ")?,
            legal_address: prompt("Legal address: ")?,
            representative_name: optional(prompt("Representative (optional): ")?),
            contact_name: prompt("Contact name: ")?,
            contact_email: prompt("Contact email: ")?,
            contact_phone: prompt("Contact phone: ")?,
        };

        self.api
            .create_organization(&request, LogoUpload::from_file_name(&file_name, bytes))
            .await?;
        println!("Organization {} created.", request.code);
        Ok(())
    }

    // =========================================================================
    // Members
    // =========================================================================

    pub async fn members(&self, page: u32) -> Result<()> {
        self.require_session()?;
        let org_id = self.selected_organization()?.id;
        let api = self.api.clone();
        let paginator = Paginator::from_fn(
            move |page, size| {
                let api = api.clone();
                async move { api.fetch_members(org_id, page, size).await }
            },
            options(page, None, true),
        );
        let state = settled(&paginator).await?;

        if state.data.is_empty() {
            println!("No members.");
            return Ok(());
        }
        for member in &state.data {
            println!(
                "{:>6}  {:<width$}  {:<32}  {}",
                member.user_id,
                truncate_string(&member.name, NAME_WIDTH),
                member.email,
                member.role,
                width = NAME_WIDTH
            );
        }
        print_page_footer(&state);
        Ok(())
    }

    pub async fn change_member(&self, action: MemberAction, user_id: i64) -> Result<()> {
        self.require_session()?;
        let org = self.selected_organization()?;
        if !org.role.can_manage_members() {
            bail!("Only organization owners can manage members");
        }

        match action {
            MemberAction::Promote => {
                self.api.promote_to_moderator(org.id, user_id).await?;
                println!("User {} is now a moderator.", user_id);
            }
            MemberAction::Demote => {
                self.api.demote_to_member(org.id, user_id).await?;
                println!("User {} is now a member.", user_id);
            }
            MemberAction::Kick => {
                if !confirm(&format!("Remove user {} from {}?", user_id, org.name))? {
                    return Ok(());
                }
                self.api.kick_member(org.id, user_id).await?;
                println!("User {} removed.", user_id);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Invitations
    // =========================================================================

    pub async fn invite(&self, email: &str, role: &str, message: Option<String>) -> Result<()> {
        self.require_session()?;
        let org = self.selected_organization()?;
        if !org.role.can_manage_invites() {
            bail!("Only owners and moderators can invite users");
        }

        let invited_role = OrganizationRole::from(role.to_string());
        if !matches!(invited_role, OrganizationRole::Member | OrganizationRole::Moderator) {
            bail!("Invalid role {:?} (expected member or moderator)", role);
        }

        let request = CreateInviteRequest {
            invitee_email: email.to_string(),
            invited_role,
            invite_message: message,
        };
        self.api.invite_user(org.id, &request).await?;
        println!("Invitation sent to {}.", email);
        Ok(())
    }

    /// Invites sent by the selected organization
    pub async fn organization_invites(&self, page: u32) -> Result<()> {
        self.require_session()?;
        let org_id = self.selected_organization()?.id;
        let api = self.api.clone();
        let paginator = Paginator::from_fn(
            move |page, size| {
                let api = api.clone();
                async move { api.fetch_organization_invites(org_id, page, size).await }
            },
            options(page, None, true),
        );
        let state = settled(&paginator).await?;
        print_invites(&state, InviteView::Sent);
        Ok(())
    }

    /// Invites received by the current user
    pub async fn my_invites(&self, page: u32) -> Result<()> {
        self.require_session()?;
        let user_id = self
            .api
            .session()
            .snapshot()
            .user_id()
            .context("Session has no user identity")?;
        let api = self.api.clone();
        let paginator = Paginator::from_fn(
            move |page, size| {
                let api = api.clone();
                async move { api.fetch_user_invites(user_id, page, size).await }
            },
            options(page, None, true),
        );
        let state = settled(&paginator).await?;
        print_invites(&state, InviteView::Received);
        Ok(())
    }

    pub async fn answer_invite(&self, action: InviteAction, token: &str) -> Result<()> {
        self.require_session()?;
        match action {
            InviteAction::Accept => {
                self.api.accept_invite(token).await?;
                // Membership changed, identity may carry new organization context
                if let Err(e) = self.api.reload_identity().await {
                    warn!(error = %e, "Failed to reload identity after accepting invite");
                }
                println!("Invitation accepted.");
            }
            InviteAction::Decline => {
                self.api.decline_invite(token).await?;
                println!("Invitation declined.");
            }
            InviteAction::Cancel => {
                if !confirm("Cancel this invitation?")? {
                    return Ok(());
                }
                self.api.cancel_invite(token).await?;
                println!("Invitation cancelled.");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAction {
    Promote,
    Demote,
    Kick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteAction {
    Accept,
    Decline,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InviteView {
    Sent,
    Received,
}

fn options(page: u32, size: Option<u32>, enabled: bool) -> PaginationOptions {
    PaginationOptions {
        initial_page: page,
        initial_size: size.filter(|s| *s > 0).unwrap_or(DEFAULT_PAGE_SIZE),
        enabled,
    }
}

/// Wait for the paginator to settle, turning a load error into a command error
async fn settled<T>(paginator: &Paginator<T>) -> Result<PageState<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let state = paginator.wait_idle().await;
    if let Some(ref error) = state.error {
        bail!("{}", error);
    }
    Ok(state)
}

fn print_page_footer<T>(state: &PageState<T>) {
    println!(
        "\nPage {} of {} ({} total)",
        state.page + 1,
        state.total_pages.max(1),
        state.total_elements
    );
}

fn print_invites(state: &PageState<OrganizationInvite>, view: InviteView) {
    if state.data.is_empty() {
        println!("No invitations.");
        return;
    }
    for invite in &state.data {
        let who = match view {
            InviteView::Sent => invite.invitee_email.clone(),
            InviteView::Received => format!(
                "{} (from {})",
                invite.organization_name,
                format_optional(&invite.inviter_name, "unknown")
            ),
        };
        println!(
            "{:<10}  {:<40}  {:<10}  expires {}  token {}",
            invite.status.to_string(),
            truncate_string(&who, 40),
            invite.invited_role,
            invite
                .expires_at
                .as_deref()
                .map(format_date)
                .unwrap_or_else(|| "-".to_string()),
            if invite.status.is_actionable() {
                invite.invite_token.as_str()
            } else {
                "-"
            }
        );
    }
    print_page_footer(state);
}

/// Email given on the command line, else asked for with the last one as default
fn choose_email(
    given: Option<String>,
    last: Option<String>,
    ask: impl FnOnce(&str) -> Result<String>,
) -> Result<String> {
    match (given, last) {
        (Some(given), _) => Ok(given),
        (None, Some(last)) => {
            let input = ask(&format!("Email [{}]: ", last))?;
            Ok(if input.is_empty() { last } else { input })
        }
        (None, None) => ask("Email: "),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_gender() -> Result<Gender> {
    let input = prompt("Gender (male/female/other): ")?;
    Gender::from_str(&input).context("Unknown gender")
}

fn confirm(question: &str) -> Result<bool> {
    let input = prompt(&format!("{} [y/N]: ", question))?;
    Ok(input.eq_ignore_ascii_case("y") || input.eq_ignore_ascii_case("yes"))
}

/// Text shown for a failed command
pub fn describe_error(error: &anyhow::Error) -> String {
    match error.downcast_ref::<ApiError>() {
        Some(e) if e.is_session_expired() => "Session expired, please log in again".to_string(),
        Some(e) => e.user_message(),
        None => format!("{:#}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_options_default_size() {
        assert_eq!(options(2, None, true).initial_size, DEFAULT_PAGE_SIZE);
        assert_eq!(options(2, Some(0), true).initial_size, DEFAULT_PAGE_SIZE);
        assert_eq!(options(2, Some(6), false).initial_size, 6);
        assert!(!options(0, None, false).enabled);
    }

    #[test]
    fn test_email_argument_skips_prompt() {
        let email = choose_email(
            Some("minh@example.com".to_string()),
            Some("lan@example.com".to_string()),
            |_| panic!("no prompt expected"),
        )
        .unwrap();
        assert_eq!(email, "minh@example.com");

        let email = choose_email(None, Some("lan@example.com".to_string()), |label| {
            assert_eq!(label, "Email [lan@example.com]: ");
            Ok(String::new())
        })
        .unwrap();
        assert_eq!(email, "lan@example.com");

        let email = choose_email(None, None, |_| Ok("new@example.com".to_string())).unwrap();
        assert_eq!(email, "new@example.com");
    }

    #[test]
    fn test_describe_session_expired() {
        let source = Arc::new(ApiError::Unauthorized("revoked".to_string()));
        let error = anyhow::Error::new(ApiError::SessionExpired(source));
        assert_eq!(describe_error(&error), "Session expired, please log in again");

        let error = anyhow::Error::new(ApiError::NotFound("Organization not found".to_string()));
        assert_eq!(describe_error(&error), "Organization not found");

        let error = anyhow::anyhow!("No organization selected");
        assert_eq!(describe_error(&error), "No organization selected");
    }
}
