//! Command-line front end. Every command returns `Result<(), String>` where
//! the error is already a localized, user-facing message.

pub mod analysis;
pub mod auth;
pub mod registry;
pub mod report;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::backend::{BackendClient, BackendError};
use crate::config::{self, AppConfig};
use crate::i18n::{Locale, Translator, FALLBACK_LOCALE};
use crate::models::{EyeSide, Gender, ImageQuality};
use crate::session::{Session, SessionStore};

#[derive(Parser, Debug)]
#[command(name = "glaucoview", version)]
#[command(about = "Clinician client for AI-assisted glaucoma screening", long_about = None)]
pub struct Cli {
    /// Interface language for this run only (en, fr, es, ar)
    #[arg(long, global = true)]
    pub lang: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session token
    Logout,
    /// Create a clinician account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Show or set the interface language
    Locale { code: Option<String> },
    /// Upload a fundus image for analysis
    Analyze {
        image: PathBuf,
        /// Registry id of the patient the image belongs to
        #[arg(long)]
        patient: Option<String>,
        /// Generate the PDF report right away
        #[arg(long)]
        report: bool,
        #[command(flatten)]
        fields: ReportFields,
    },
    /// Patient registry
    Patients {
        #[command(subcommand)]
        action: Option<PatientsAction>,
    },
    /// Past analyses
    History,
    /// Dashboard counters
    Stats,
    /// Ask the clinical assistant
    Chat {
        message: String,
        /// History id of the analysis to discuss
        #[arg(long)]
        analysis: Option<String>,
    },
    /// Ask the application guide
    Guide { message: String },
    /// Generate a PDF report from a past analysis or a saved draft
    Report {
        /// History id of the analysis
        #[arg(long, conflicts_with = "draft", required_unless_present = "draft")]
        history: Option<String>,
        /// Draft file written by `--save-draft`
        #[arg(long)]
        draft: Option<PathBuf>,
        /// Write the editable draft here instead of generating the PDF
        #[arg(long)]
        save_draft: Option<PathBuf>,
        #[command(flatten)]
        fields: ReportFields,
    },
}

#[derive(Subcommand, Debug)]
pub enum PatientsAction {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: Option<u32>,
        /// M or F
        #[arg(long)]
        gender: Gender,
        #[arg(long)]
        phone: Option<String>,
    },
}

/// Report fields the clinician can edit before generation.
#[derive(Args, Debug, Default, Clone)]
pub struct ReportFields {
    #[arg(long)]
    pub doctor: Option<String>,
    #[arg(long)]
    pub clinic: Option<String>,
    /// right, left or both
    #[arg(long)]
    pub eye: Option<EyeSide>,
    /// poor, fair, good or excellent
    #[arg(long)]
    pub quality: Option<ImageQuality>,
    #[arg(long)]
    pub observations: Option<String>,
    #[arg(long)]
    pub diagnosis: Option<String>,
    /// Replaces the default list; repeat for several
    #[arg(long = "recommendation")]
    pub recommendations: Vec<String>,
    /// Output directory (defaults to the exports folder)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Per-command state: configuration, session and backend client.
pub struct AppContext {
    pub config: AppConfig,
    pub store: SessionStore,
    pub session: Session,
    pub client: BackendClient,
}

impl AppContext {
    pub fn load(lang: Option<&str>) -> Result<Self, String> {
        let system_lang = std::env::var("LANG").ok();
        // no session yet: errors use the requested or detected language
        let early = startup_translator(lang, system_lang.as_deref());
        let config = AppConfig::from_env().map_err(|e| {
            tracing::error!(error = %e, "Invalid configuration");
            e.user_message(&early)
        })?;
        let store = SessionStore::new(config::session_path());
        let mut session = store.load(system_lang.as_deref()).map_err(|e| {
            tracing::error!(error = %e, "Session load failed");
            e.user_message(&early)
        })?;

        if let Some(code) = lang {
            let locale = parse_locale(code, &session.translator())?;
            session.override_locale(locale);
        }
        let client = BackendClient::new(&config).map_err(|e| e.user_message(&session.translator()))?;

        Ok(Self {
            config,
            store,
            session,
            client,
        })
    }

    pub fn tr(&self) -> Translator {
        self.session.translator()
    }

    pub fn save_session(&self) -> Result<(), String> {
        self.store.save(&self.session).map_err(|e| {
            tracing::error!(error = %e, "Session save failed");
            e.user_message(&self.tr())
        })
    }

    /// Log the full error, return the localized message.
    pub fn fail(&self, error: BackendError) -> String {
        tracing::error!(error = %error, "Command failed");
        let tr = self.tr();
        let message = error.user_message(&tr);
        if error.needs_login() {
            format!("{message}\n{}", tr.t("cli.login_hint"))
        } else {
            message
        }
    }
}

fn startup_translator(lang: Option<&str>, system_lang: Option<&str>) -> Translator {
    let locale = lang
        .and_then(Locale::parse)
        .or_else(|| system_lang.and_then(Locale::parse))
        .unwrap_or(FALLBACK_LOCALE);
    Translator::new(locale)
}

fn parse_locale(code: &str, tr: &Translator) -> Result<Locale, String> {
    Locale::parse(code).ok_or_else(|| tr.t_with("cli.unknown_locale", &[("code", code)]))
}

pub async fn dispatch(cli: Cli) -> Result<(), String> {
    let mut ctx = AppContext::load(cli.lang.as_deref())?;

    match cli.command {
        Command::Login { email, password } => auth::login(&mut ctx, &email, &password).await,
        Command::Logout => auth::logout(&mut ctx),
        Command::Signup { email, password } => auth::signup(&ctx, &email, &password).await,
        Command::Locale { code } => auth::locale(&mut ctx, code.as_deref()),
        Command::Analyze {
            image,
            patient,
            report,
            fields,
        } => analysis::analyze(&ctx, &image, patient.as_deref(), report, &fields).await,
        Command::Patients { action } => match action.unwrap_or(PatientsAction::List) {
            PatientsAction::List => registry::list_patients(&ctx).await,
            PatientsAction::Add {
                name,
                age,
                gender,
                phone,
            } => registry::add_patient(&ctx, name, age, gender, phone).await,
        },
        Command::History => registry::history(&ctx).await,
        Command::Stats => registry::stats(&ctx).await,
        Command::Chat { message, analysis } => {
            analysis::chat(&ctx, &message, analysis.as_deref()).await
        }
        Command::Guide { message } => analysis::guide(&ctx, &message).await,
        Command::Report {
            history,
            draft,
            save_draft,
            fields,
        } => match draft {
            Some(path) => report::from_draft(&ctx, &path, save_draft.as_deref(), &fields).await,
            // clap guarantees one of the two
            None => {
                let id = history.unwrap_or_default();
                report::from_history(&ctx, &id, save_draft.as_deref(), &fields).await
            }
        },
    }
}
