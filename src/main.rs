//! CampusRide CLI. Drives the library the way the production web UI does:
//! auth flows, rider and driver dashboards, and live polling watchers.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use campusride::api::MessageResponse;
use campusride::{
    ApiClient, ApiError, ClientConfig, DriverBoard, DriverDashboard, DriverEvent, NewAccount,
    NewReview, NewRideRequest, RespondOutcome, Review, RiderDashboard, RiderEvent, RideAction,
    RideRequest, Role, Session, driver, rider,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("invalid ride date `{0}`; use RFC 3339 or YYYY-MM-DDTHH:MM:SS (UTC)")]
    InvalidDate(String),
    #[error("no active ride request")]
    NoActiveRequest,
    #[error("not signed in; run `campusride auth login` first")]
    NotSignedIn,
}

#[derive(Parser, Debug)]
#[command(name = "campusride", about = "CampusRide ride-sharing client")]
struct Cli {
    #[arg(long, env = "CAMPUSRIDE_BASE_URL", default_value = campusride::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Where the session token is persisted. Defaults to
    /// `~/.campusride/session`.
    #[arg(long, env = "CAMPUSRIDE_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the backend is reachable.
    Ping,
    Auth(AuthCommand),
    Rider(RiderCommand),
    Driver(DriverCommand),
}

/// Registration, verification, and session management.
#[derive(Args, Debug)]
struct AuthCommand {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand, Debug)]
enum AuthSubcommand {
    /// List the universities the service covers.
    Universities,
    /// Create an account and trigger the verification email.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
        #[arg(long)]
        university: String,
        /// Required when registering as a driver.
        #[arg(long)]
        license_plate: Option<String>,
    },
    /// Redeem the emailed verification code and sign in.
    Verify {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
    /// Sign in with email and password.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Show the signed-in profile.
    Whoami,
    /// Forget the stored session.
    Logout,
}

/// The rider's side of the ride lifecycle.
#[derive(Args, Debug)]
struct RiderCommand {
    #[command(subcommand)]
    command: RiderSubcommand,
}

#[derive(Subcommand, Debug)]
enum RiderSubcommand {
    /// Show the active ride request, if any.
    Status,
    /// Submit a new ride request.
    Request {
        #[arg(long)]
        pickup: String,
        #[arg(long)]
        destination: String,
        /// Ride date/time, RFC 3339 or naive UTC (e.g. 2026-09-01T10:00:00).
        #[arg(long)]
        at: String,
    },
    /// Cancel the active request.
    Cancel,
    /// Review a completed ride.
    Review {
        ride_id: i64,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        comment: String,
    },
    /// Show the review on a ride, if one exists.
    ShowReview { ride_id: i64 },
    /// Poll the active request and print lifecycle changes as they happen.
    Watch {
        #[arg(long, default_value_t = rider::DEFAULT_POLL_PERIOD.as_secs())]
        period_secs: u64,
    },
}

/// The driver's side of the ride lifecycle.
#[derive(Args, Debug)]
struct DriverCommand {
    #[command(subcommand)]
    command: DriverSubcommand,
}

#[derive(Subcommand, Debug)]
enum DriverSubcommand {
    /// Show pending requests for your campus and your accepted rides.
    Board,
    /// Accept or decline a pending request.
    Respond {
        ride_id: i64,
        #[arg(value_parser = parse_action)]
        action: RideAction,
    },
    /// Mark an accepted ride as done.
    Complete { ride_id: i64 },
    /// Poll the board and print changes as they happen.
    Watch {
        #[arg(long, default_value_t = driver::DEFAULT_POLL_PERIOD.as_secs())]
        period_secs: u64,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "rider" => Ok(Role::Rider),
        "driver" => Ok(Role::Driver),
        other => Err(format!("unknown role `{other}`; expected rider or driver")),
    }
}

fn parse_action(raw: &str) -> Result<RideAction, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "accept" => Ok(RideAction::Accept),
        "decline" => Ok(RideAction::Decline),
        other => Err(format!("unknown action `{other}`; expected accept or decline")),
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    config.base_url = cli.base_url;
    if let Some(path) = cli.token_file {
        config.token_path = Some(path);
    }
    let api = ApiClient::new(&config)?;

    match cli.command {
        Command::Ping => run_ping(&api).await,
        Command::Auth(auth) => run_auth(&api, auth).await,
        Command::Rider(rider) => run_rider(&api, rider).await,
        Command::Driver(driver) => run_driver(&api, driver).await,
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("campusride=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run_ping(api: &ApiClient) -> Result<(), CliError> {
    api.ping().await?;
    println!("ok");
    Ok(())
}

// =============================================================================
// AUTH
// =============================================================================

async fn run_auth(api: &ApiClient, auth: AuthCommand) -> Result<(), CliError> {
    match auth.command {
        AuthSubcommand::Universities => {
            for university in api.universities().await? {
                println!("{:<12} {} ({})", university.key, university.name, university.domains.join(", "));
            }
            Ok(())
        }
        AuthSubcommand::Register {
            email,
            password,
            full_name,
            role,
            university,
            license_plate,
        } => {
            let account = NewAccount {
                email,
                password,
                full_name,
                role,
                university_key: university,
                license_plate,
            };
            let MessageResponse { message } = api.register(&account).await?;
            println!("{message}");
            Ok(())
        }
        AuthSubcommand::Verify { email, code } => {
            api.verify_email(&email, &code).await?;
            let user = api.me().await?;
            println!("verified; signed in as {} ({})", user.full_name, user.role);
            Ok(())
        }
        AuthSubcommand::Login { email, password } => {
            let mut session = Session::new();
            let user = session.login(api, &email, &password).await?;
            println!("signed in as {} ({})", user.full_name, user.role);
            Ok(())
        }
        AuthSubcommand::Whoami => {
            let mut session = Session::new();
            session.bootstrap(api).await?;
            match session.user {
                Some(user) => {
                    println!("{} <{}>", user.full_name, user.email);
                    println!("role:       {}", user.role);
                    println!("university: {}", user.university_key);
                    if let Some(plate) = &user.license_plate {
                        println!("plate:      {plate}");
                    }
                    Ok(())
                }
                None => Err(CliError::NotSignedIn),
            }
        }
        AuthSubcommand::Logout => {
            api.logout()?;
            println!("signed out");
            Ok(())
        }
    }
}

// =============================================================================
// RIDER
// =============================================================================

async fn run_rider(api: &ApiClient, command: RiderCommand) -> Result<(), CliError> {
    let dashboard = RiderDashboard::new(api.clone());
    match command.command {
        RiderSubcommand::Status => {
            match dashboard.current_request().await? {
                Some(ride) => print_ride(&ride),
                None => println!("no active ride request"),
            }
            Ok(())
        }
        RiderSubcommand::Request {
            pickup,
            destination,
            at,
        } => {
            let ride_date = parse_ride_date(&at)?;
            let ride = dashboard
                .create_request(&NewRideRequest {
                    pickup_location: pickup,
                    destination,
                    ride_date,
                })
                .await?;
            print_ride(&ride);
            Ok(())
        }
        RiderSubcommand::Cancel => {
            let active = dashboard
                .current_request()
                .await?
                .ok_or(CliError::NoActiveRequest)?;
            let cancelled = dashboard.cancel(active.id).await?;
            print_ride(&cancelled);
            Ok(())
        }
        RiderSubcommand::Review {
            ride_id,
            rating,
            comment,
        } => {
            let review = dashboard
                .submit_review(ride_id, &NewReview { rating, comment })
                .await?;
            print_review(&review);
            Ok(())
        }
        RiderSubcommand::ShowReview { ride_id } => {
            match dashboard.review(ride_id).await? {
                Some(review) => print_review(&review),
                None => println!("no review yet"),
            }
            Ok(())
        }
        RiderSubcommand::Watch { period_secs } => {
            rider_watch(&dashboard, Duration::from_secs(period_secs)).await
        }
    }
}

async fn rider_watch(dashboard: &RiderDashboard, period: Duration) -> Result<(), CliError> {
    let (poller, mut events) = dashboard.watch(period);
    println!("watching your ride request (Ctrl-C to stop)...");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(RiderEvent::Updated(ride)) => print_ride(&ride),
                Some(RiderEvent::Ended { last }) => {
                    match last {
                        Some(ride) => println!("request #{} left the active slot (last status: {})", ride.id, ride.status),
                        None => println!("no active ride request"),
                    }
                }
                Some(RiderEvent::FetchFailed(message)) => eprintln!("refresh failed: {message}"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                poller.stop().await;
                break;
            }
        }
    }
    Ok(())
}

// =============================================================================
// DRIVER
// =============================================================================

async fn run_driver(api: &ApiClient, command: DriverCommand) -> Result<(), CliError> {
    let dashboard = DriverDashboard::new(api.clone());
    match command.command {
        DriverSubcommand::Board => {
            print_board(&dashboard.board().await?);
            Ok(())
        }
        DriverSubcommand::Respond { ride_id, action } => {
            match dashboard.respond(ride_id, action).await? {
                RespondOutcome::Updated(ride) => print_ride(&ride),
                RespondOutcome::Raced { message, board } => {
                    println!("{message}");
                    print_board(&board);
                }
            }
            Ok(())
        }
        DriverSubcommand::Complete { ride_id } => {
            let ride = dashboard.complete(ride_id).await?;
            print_ride(&ride);
            Ok(())
        }
        DriverSubcommand::Watch { period_secs } => {
            driver_watch(&dashboard, Duration::from_secs(period_secs)).await
        }
    }
}

async fn driver_watch(dashboard: &DriverDashboard, period: Duration) -> Result<(), CliError> {
    let (poller, mut events) = dashboard.watch(period);
    println!("watching the board (Ctrl-C to stop)...");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(DriverEvent::BoardChanged(board)) => print_board(&board),
                Some(DriverEvent::FetchFailed(message)) => eprintln!("refresh failed: {message}"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                poller.stop().await;
                break;
            }
        }
    }
    Ok(())
}

// =============================================================================
// RENDERING
// =============================================================================

fn parse_ride_date(raw: &str) -> Result<OffsetDateTime, CliError> {
    campusride::types::iso8601::parse(raw).ok_or_else(|| CliError::InvalidDate(raw.to_owned()))
}

fn format_datetime(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.to_string())
}

fn print_ride(ride: &RideRequest) {
    println!(
        "#{:<5} {:<9} {} -> {}  at {}",
        ride.id,
        ride.status,
        ride.pickup_location,
        ride.destination,
        format_datetime(ride.ride_date),
    );
    println!("       rider: {} <{}>", ride.rider.full_name, ride.rider.email);
    if let Some(driver) = &ride.driver {
        let plate = driver.license_plate.as_deref().unwrap_or("unknown plate");
        println!("       driver: {} <{}> ({plate})", driver.full_name, driver.email);
    }
}

fn print_board(board: &DriverBoard) {
    println!("pending requests ({}):", board.pending.len());
    for ride in &board.pending {
        print_ride(ride);
    }
    println!("accepted rides ({}):", board.accepted.len());
    for ride in &board.accepted {
        print_ride(ride);
    }
}

fn print_review(review: &Review) {
    println!(
        "review #{} on ride #{}: {}/5 \"{}\"",
        review.id, review.ride_id, review.rating, review.comment
    );
}
