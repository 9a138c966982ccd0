//! Synthesizes and checks the GitHub OIDC deployment stack.
//!
//! Nothing here deploys. `synth` writes a CloudFormation template for an
//! external tool, the other commands inspect and simulate the stack. Run with
//! `RUST_LOG=info` to see how the stack is assembled.
//!
//! ```sh
//! cargo run -p oidc-stack-infra -- synth --out cdk.out/stack.template.json
//! cargo run -p oidc-stack-infra -- --account 123456789012 assume --branch main --actor smoogly
//! cargo run -p oidc-stack-infra -- --account 123456789012 check \
//!     --action sts:AssumeRoleWithWebIdentity \
//!     --resource arn:aws:iam::123456789012:role/cdk-hnb659fds-cfn-exec-role-123456789012-us-east-1
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use stack::{
    arn::AccountId,
    simulate::{Decision, TokenClaims},
    template::{logical_id, Template},
    Output, Stack, StackConfig,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "infra",
    about = "Synthesize and check the GitHub Actions deployment stack"
)]
struct Cli {
    /// Stack configuration. Defaults are used if the file does not exist.
    #[arg(long, default_value = "stack.toml")]
    config: PathBuf,

    /// Target account. Without one, ARNs reference the deploying account.
    #[arg(long, env = "AWS_ACCOUNT_ID")]
    account: Option<String>,

    /// Overrides the configured stage.
    #[arg(long)]
    stage: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the CloudFormation template, or save it.
    Synth {
        #[clap(long)]
        out: Option<PathBuf>,
    },
    /// Print the stack's outputs and security posture.
    Outputs,
    /// Simulate a workflow run assuming the deployment role.
    Assume {
        #[clap(long, default_value = "main")]
        branch: String,
        #[clap(long)]
        actor: String,
        /// Defaults to the trusted repository.
        #[clap(long)]
        repository: Option<String>,
        /// Use this subject claim instead of the one GitHub would issue.
        #[clap(long)]
        subject: Option<String>,
    },
    /// Simulate the deployment role calling an action on a resource.
    Check {
        #[clap(long)]
        action: String,
        #[clap(long)]
        resource: String,
        /// Ask IAM's policy simulator instead of simulating locally.
        #[clap(long, default_value = "false")]
        remote: bool,
    },
}

fn load_config(cli: &Cli) -> Result<StackConfig, stack::Error> {
    let mut config = StackConfig::from_path_or_default(&cli.config)?;
    log::debug!("loaded config from {:?}", cli.config);
    if let Some(account) = cli.account.as_deref() {
        config.account = Some(AccountId::new(account)?);
    }
    if let Some(stage) = cli.stage.as_ref() {
        config.app.stage = stage.clone();
    }
    Ok(config)
}

fn print_decision(what: &str, decision: Decision) {
    let decision_string = match decision {
        Decision::Allowed => decision.to_string().green(),
        Decision::ExplicitDeny => decision.to_string().red().bold(),
        Decision::ImplicitDeny => decision.to_string().red(),
    };
    println!("{what}: {decision_string}");
}

fn print_outputs(stack: &Stack) {
    println!("Stack: {}", stack.name.bold());
    for output in stack.outputs.iter() {
        match output {
            Output::RoleArn { name, role_id } => {
                println!("  {name} = Arn of {}", logical_id(role_id));
            }
        }
    }
    println!();
    println!("Trust:");
    println!("  provider: {}", stack.provider.arn);
    for (operator, keys) in stack
        .access_role
        .trust
        .statement
        .iter()
        .flat_map(|statement| statement.condition.iter())
    {
        for (key, values) in keys.iter() {
            let values = values.iter().cloned().collect::<Vec<_>>().join(", ");
            println!("  {operator:?} {key}: {values}");
        }
    }
    println!("Permissions:");
    if stack.access_role.is_administrator() {
        println!("  {}", "AdministratorAccess".red().bold());
    } else {
        println!(
            "  least privilege, bootstrap qualifier '{}'",
            stack.qualifier
        );
    }
    println!(
        "Function '{}': parameter {} at {}",
        stack.function.id, stack.function.parameter.name, stack.function.parameter_path
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let stack = Stack::new(&config)?;

    let allowed = match cli.command {
        Command::Synth { out } => {
            let template = Template::synth(&stack)?;
            if let Some(path) = out {
                if template.save(&path).await? {
                    println!("Wrote {}", path.display());
                } else {
                    println!("{} is up to date", path.display());
                }
            } else {
                println!("{}", template.to_json_string()?);
            }
            true
        }
        Command::Outputs => {
            print_outputs(&stack);
            true
        }
        Command::Assume {
            branch,
            actor,
            repository,
            subject,
        } => {
            let repository = repository.unwrap_or(config.github.repository);
            let mut claims = TokenClaims::github_run_for_scope(
                &stack.provider.host,
                &repository,
                &branch,
                &actor,
                config.github.scope,
            );
            if let Some(subject) = subject {
                claims = claims.with("sub", subject);
            }
            let decision = stack.simulate_assume(&claims)?;
            print_decision(
                &format!(
                    "token with sub '{}'",
                    claims.get("sub").unwrap_or_default()
                ),
                decision,
            );
            decision.is_allowed()
        }
        Command::Check {
            action,
            resource,
            remote,
        } => {
            if remote {
                let account = stack
                    .account
                    .clone()
                    .ok_or("--remote requires an account, pass --account")?;
                let cfg = aws_config::from_env()
                    .region(aws_config::Region::new(stack.region.clone()))
                    .load()
                    .await;
                let results = stack::aws::simulate_role(
                    &cfg,
                    &account,
                    &stack.access_role,
                    &[action],
                    &[resource],
                )
                .await
                .map_err(stack::Error::from)?;
                let mut all_allowed = !results.is_empty();
                for result in results {
                    print_decision(
                        &format!(
                            "{} on {}",
                            result.action,
                            result.resource.as_deref().unwrap_or("*")
                        ),
                        result.decision,
                    );
                    all_allowed &= result.decision.is_allowed();
                }
                all_allowed
            } else {
                let decision = stack.simulate_access(&action, &resource)?;
                print_decision(&format!("{action} on {resource}"), decision);
                decision.is_allowed()
            }
        }
    };

    if !allowed {
        std::process::exit(1);
    }
    Ok(())
}
