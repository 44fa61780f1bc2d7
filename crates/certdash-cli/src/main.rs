//! certdash - command-line front end for the certificate platform admin API.
//!
//! Signs users in, keeps the session alive across runs and exposes the
//! account, organization, member and invitation endpoints as commands.

mod app;

use std::io;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::{describe_error, App, InviteAction, MemberAction};

const USAGE: &str = "\
Usage: certdash <command> [args]

Account:
  login [email]                   Sign in
  logout                          Sign out and forget the session
  register                        Create an account
  whoami                          Show the signed-in user
  profile [--edit]                Show or edit your profile

Organizations:
  orgs [page] [size]              List your organizations
  org [id]                        Show organization details
  use <id>                        Select an organization for the commands below
  create-org <logo-file>          Create an organization

Members (selected organization):
  members [page]                  List members
  promote <userId>                Make a member a moderator
  demote <userId>                 Make a moderator a member
  kick <userId>                   Remove a member

Invitations:
  invite <email> <role> [message] Invite a user to the selected organization
  invites [page]                  Invitations sent by the selected organization
  my-invites [page]               Invitations you received
  accept <token>                  Accept an invitation
  decline <token>                 Decline an invitation
  cancel <token>                  Cancel an invitation you sent

Pages are numbered from 1.";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // RUST_LOG controls the level (e.g. RUST_LOG=certdash_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    };
    if matches!(command, "help" | "-h" | "--help") {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    match run(command, &args[1..]).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(command, error = %e, "Command failed");
            eprintln!("{}", describe_error(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: &str, args: &[String]) -> Result<()> {
    let mut app = App::new().await?;
    info!(command, "Running command");

    match command {
        "login" => app.login(args.first().cloned()).await,
        "logout" => app.logout().await,
        "register" => app.register().await,
        "whoami" => app.whoami(),
        "profile" => app.profile(args.iter().any(|a| a == "--edit")).await,

        "orgs" => {
            let page = page_arg(args, 0)?;
            let size = args.get(1).map(|s| parse_number::<u32>(s, "size")).transpose()?;
            app.organizations(page, size).await
        }
        "org" => {
            let id = args.first().map(|s| parse_number::<i64>(s, "id")).transpose()?;
            app.organization(id).await
        }
        "use" => app.use_organization(parse_number(required(args, 0, "id")?, "id")?).await,
        "create-org" => app.create_organization(required(args, 0, "logo-file")?).await,

        "members" => app.members(page_arg(args, 0)?).await,
        "promote" | "demote" | "kick" => {
            let action = match command {
                "promote" => MemberAction::Promote,
                "demote" => MemberAction::Demote,
                _ => MemberAction::Kick,
            };
            let user_id = parse_number(required(args, 0, "userId")?, "userId")?;
            app.change_member(action, user_id).await
        }

        "invite" => {
            let email = required(args, 0, "email")?;
            let role = required(args, 1, "role")?;
            let message = (args.len() > 2).then(|| args[2..].join(" "));
            app.invite(email, role, message).await
        }
        "invites" => app.organization_invites(page_arg(args, 0)?).await,
        "my-invites" => app.my_invites(page_arg(args, 0)?).await,
        "accept" | "decline" | "cancel" => {
            let action = match command {
                "accept" => InviteAction::Accept,
                "decline" => InviteAction::Decline,
                _ => InviteAction::Cancel,
            };
            app.answer_invite(action, required(args, 0, "token")?).await
        }

        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn required<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("Missing <{}> argument", name))
}

fn parse_number<N: std::str::FromStr>(value: &str, name: &str) -> Result<N> {
    value
        .parse()
        .ok()
        .with_context(|| format!("Invalid {}: {}", name, value))
}

/// One-based page argument converted to the zero-based page index
fn page_arg(args: &[String], index: usize) -> Result<u32> {
    match args.get(index) {
        Some(value) => Ok(parse_number::<u32>(value, "page")?.saturating_sub(1)),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_page_arg_is_one_based() {
        assert_eq!(page_arg(&args(&[]), 0).unwrap(), 0);
        assert_eq!(page_arg(&args(&["1"]), 0).unwrap(), 0);
        assert_eq!(page_arg(&args(&["3"]), 0).unwrap(), 2);
        assert_eq!(page_arg(&args(&["0"]), 0).unwrap(), 0);
        assert!(page_arg(&args(&["two"]), 0).is_err());
    }

    #[test]
    fn test_required_argument() {
        let values = args(&["lan@example.com"]);
        assert_eq!(required(&values, 0, "email").unwrap(), "lan@example.com");
        let err = required(&values, 1, "role").unwrap_err();
        assert_eq!(err.to_string(), "Missing <role> argument");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number::<i64>("42", "id").unwrap(), 42);
        assert!(parse_number::<i64>("abc", "id").is_err());
    }
}
