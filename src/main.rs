mod cli;
mod output;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billbook::billing::draft::CustomerChoice;
use billbook::commands::{auth, bills, customers, dashboard, profile, settings};
use billbook::db::Database;
use billbook::models::{NewCustomer, ProfileUpdate};
use billbook::services::state::{load_settings, AppState};
use cli::{
    AuthCommand, BillCommand, Commands, CommandLine, CustomerCommand, NewBillArgs, ProfileCommand,
    SettingsCommand,
};

#[tokio::main]
async fn main() -> ExitCode {
    let commands = CommandLine::parse_args();
    init_tracing(commands.verbose);

    match run(commands).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            output::failure(&format!("{:#}", err));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_state(data_dir: Option<PathBuf>) -> Result<AppState> {
    let data_dir = match data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .ok_or_else(|| anyhow!("No data directory on this system; pass --data-dir"))?
            .join("billbook"),
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Creating {}", data_dir.display()))?;

    let db = Database::new(&data_dir.join("billbook.sqlite"))?;
    let settings = load_settings(&db);
    AppState::new(db, settings, data_dir)
}

async fn run(commands: CommandLine) -> Result<()> {
    let state = open_state(commands.data_dir)?;

    match commands.command {
        Commands::Auth(command) => run_auth(command, &state).await,
        Commands::Profile(command) => run_profile(command, &state).await,
        Commands::Customer(command) => run_customer(command, &state).await,
        Commands::Bill(command) => run_bill(command, &state).await,
        Commands::Dashboard => {
            let session = state.require_session()?;
            let stats = dashboard::get_dashboard_stats(Local::now(), &session, &state).await?;
            output::dashboard(&stats, &state.settings()?.currency_symbol);
            Ok(())
        }
        Commands::Settings(command) => run_settings(command, &state).await,
    }
}

async fn run_auth(command: AuthCommand, state: &AppState) -> Result<()> {
    match command {
        AuthCommand::SignUp(credentials) => {
            let user = auth::sign_up(&credentials.email, &credentials.password, state).await?;
            output::success(&format!("Account created for {}", user.email));
        }
        AuthCommand::SignIn(credentials) => {
            let session = auth::sign_in(&credentials.email, &credentials.password, state).await?;
            output::success(&format!("Signed in as {}", session.user.email));
        }
        AuthCommand::SignOut => {
            let session = state.require_session()?;
            auth::sign_out(&session, state).await?;
            output::success("Signed out");
        }
        AuthCommand::Whoami => {
            let session = state.require_session()?;
            let user = auth::current_user(&session, state).await?;
            output::user(&user);
        }
    }
    Ok(())
}

async fn run_profile(command: ProfileCommand, state: &AppState) -> Result<()> {
    let session = state.require_session()?;
    match command {
        ProfileCommand::Show => {
            output::profile(&profile::get_profile(&session, state).await?);
        }
        ProfileCommand::Set {
            full_name,
            company_name,
            company_address,
            gstin,
        } => {
            let update = ProfileUpdate {
                full_name,
                company_name,
                company_address,
                gstin,
                signature_url: None,
            };
            let saved = profile::save_profile(update, &session, state).await?;
            output::profile(&saved);
            output::success("Profile updated successfully");
        }
        ProfileCommand::Signature { path } => {
            profile::upload_signature(&path, &session, state).await?;
            output::success("Signature uploaded successfully");
        }
    }
    Ok(())
}

async fn run_customer(command: CustomerCommand, state: &AppState) -> Result<()> {
    let session = state.require_session()?;
    match command {
        CustomerCommand::Add(args) => {
            let customer = NewCustomer {
                name: args.name,
                mobile_number: args.mobile,
                email: args.email,
                address: args.address,
            };
            let created = customers::add_customer(customer, &session, state).await?;
            output::success(&format!("Customer {} added ({})", created.name, created.id));
        }
        CustomerCommand::List => {
            output::customers(&customers::list_customers(&session, state).await?);
        }
        CustomerCommand::Show { id } => {
            output::customer(&customers::get_customer(&id, &session, state).await?);
        }
    }
    Ok(())
}

async fn run_bill(command: BillCommand, state: &AppState) -> Result<()> {
    let session = state.require_session()?;
    let currency = state.settings()?.currency_symbol;
    match command {
        BillCommand::New(args) => new_bill(args, &session, state, &currency).await?,
        BillCommand::List { filter, search } => {
            let found = bills::list_bills(filter, search.as_deref(), &session, state).await?;
            output::bill_list(&found, &currency);
        }
        BillCommand::Show { id } => {
            let detail = bills::get_bill_detail(&id, &session, state).await?;
            output::bill_detail(&detail, &currency);
        }
        BillCommand::Pdf { id, out, open } => {
            let path = bills::export_bill_pdf(&id, out.as_deref(), open, &session, state).await?;
            output::success(&format!("Invoice saved to {}", path.display()));
        }
    }
    Ok(())
}

async fn new_bill(
    args: NewBillArgs,
    session: &billbook::models::Session,
    state: &AppState,
    currency: &str,
) -> Result<()> {
    let mut draft = if args.preview {
        bills::start_preview()
    } else {
        bills::start_bill(session, state).await?
    };

    let customer = match (args.customer_id, args.name) {
        (Some(id), _) => {
            let existing = customers::get_customer(&id, session, state).await?;
            CustomerChoice::Existing {
                id: existing.id,
                name: existing.name,
            }
        }
        (None, Some(name)) => CustomerChoice::New(NewCustomer {
            name,
            mobile_number: args.mobile,
            email: args.email,
            address: args.address,
        }),
        (None, None) => return Err(anyhow!("Customer name is required")),
    };
    draft.set_customer(customer);

    for item in &args.items {
        draft.push_item(&item.name, item.quantity, item.price);
    }
    draft.set_payment_mode(args.payment_mode);
    if let Some(warning) = draft.set_discount(args.discount) {
        output::warning(&warning.to_string());
    }
    if let Some(warning) = draft.set_amount_received(args.received) {
        output::warning(&warning.to_string());
    }

    if args.preview {
        draft.validate()?;
        print!("{}", bills::preview_draft(&draft, session, state).await?);
        return Ok(());
    }

    let detail = bills::submit_bill(&draft, session, state).await?;
    output::bill_detail(&detail, currency);
    output::success("Bill created successfully");
    Ok(())
}

async fn run_settings(command: SettingsCommand, state: &AppState) -> Result<()> {
    match command {
        SettingsCommand::Show => output::settings(&settings::get_settings(state)?),
        SettingsCommand::Set {
            backend,
            remote_url,
            remote_api_key,
            company_name,
            currency,
        } => {
            let payload = settings::SettingsPayload {
                backend,
                remote_url,
                remote_api_key,
                default_company_name: company_name,
                currency_symbol: currency,
            };
            let saved = settings::save_settings(payload, state)?;
            output::settings(&saved);
            output::success("Settings saved");
        }
        SettingsCommand::Test { url, api_key } => {
            if settings::test_connection(&url, &api_key).await? {
                output::success("Backend reachable");
            } else {
                return Err(anyhow!("Backend rejected the credentials"));
            }
        }
    }
    Ok(())
}
