use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use std::env;

use admission_desk::{
    attendance_on, sign_ins_for_member, AdmissionEngine, MemberId, SqliteStore,
};

const DEFAULT_DB_PATH: &str = "admission.db";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "init" => cmd_init(),
        "check" => cmd_check(&args[2..]),
        "member" => cmd_member(&args[2..]),
        "waiver" => cmd_waiver(&args[2..]),
        "payment" => cmd_payment(&args[2..]),
        "add-waiver-term" => cmd_add_waiver_term(&args[2..]),
        "add-payment-term" => cmd_add_payment_term(&args[2..]),
        "terms" => cmd_terms(),
        "attendance" => cmd_attendance(&args[2..]),
        "history" => cmd_history(&args[2..]),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    eprintln!("Admission Desk v{}", admission_desk::VERSION);
    eprintln!();
    eprintln!("Usage: admission-desk <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  init                                    Create the database");
    eprintln!("  check <id>                              Run an admission check");
    eprintln!("  member <id> <name> [email]              Register or update a member");
    eprintln!("  waiver <id> <term>                      Record a signed waiver");
    eprintln!("  payment <id> <term>                     Record a payment");
    eprintln!("  add-waiver-term <name> <valid-until>    Add a waiver term");
    eprintln!("  add-payment-term <name> <amount> <valid-until>");
    eprintln!("  terms                                   List current terms");
    eprintln!("  attendance <date>                       Sign-ins for a date (YYYY-MM-DD)");
    eprintln!("  history <id>                            Sign-in history for a member");
    eprintln!();
    eprintln!("Database path is taken from ADMISSION_DB (default: {})", DEFAULT_DB_PATH);
}

fn db_path() -> String {
    env::var("ADMISSION_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}

fn open_store() -> Result<SqliteStore> {
    let path = db_path();
    SqliteStore::open(&path).with_context(|| format!("Failed to open database at {}", path))
}

fn parse_id(raw: &str) -> Result<MemberId> {
    MemberId::normalize(raw).with_context(|| format!("Invalid member identifier '{}'", raw))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw))
}

fn cmd_init() -> Result<()> {
    open_store()?;
    println!("✓ Database ready at {}", db_path());
    Ok(())
}

fn cmd_check(args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("Usage: admission-desk check <id>");
    }
    let id = parse_id(&args[0])?;

    let mut engine = AdmissionEngine::new(open_store()?);
    let outcome = engine.evaluate(&id)?;

    println!("ID: {}", id);
    if let Some(name) = &outcome.name {
        println!("Name: {}", name);
    }
    let mark = if outcome.admitted() { "✓" } else { "✗" };
    println!("{} [{}] {}", mark, outcome.status.as_str(), outcome.message);

    Ok(())
}

fn cmd_member(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("Usage: admission-desk member <id> <name> [email]");
    }
    let id = parse_id(&args[0])?;
    let email = args.get(2).map(|s| s.as_str());

    let store = open_store()?;
    let (change, member) = admission_desk::upsert_member(
        store.connection(),
        &id,
        Some(args[1].as_str()),
        email,
        Utc::now(),
    )?;

    println!("✓ {}: {} ({})", change.message(), member.name, member.member_id);
    Ok(())
}

fn cmd_waiver(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("Usage: admission-desk waiver <id> <term>");
    }
    let id = parse_id(&args[0])?;

    let store = open_store()?;
    let waiver = admission_desk::record_waiver(store.connection(), &id, &args[1], Utc::now())?;

    println!("✓ Waiver recorded for {} (valid until {})", id, waiver.valid_until);
    Ok(())
}

fn cmd_payment(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("Usage: admission-desk payment <id> <term>");
    }
    let id = parse_id(&args[0])?;

    let store = open_store()?;
    let payment = admission_desk::record_payment(store.connection(), &id, &args[1], Utc::now())?;

    println!(
        "✓ Payment of {:.2} recorded for {} (valid until {})",
        payment.amount, id, payment.valid_until
    );
    Ok(())
}

fn cmd_add_waiver_term(args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("Usage: admission-desk add-waiver-term <name> [valid-until]");
    }
    let valid_until = args.get(1).map(|s| parse_date(s)).transpose()?;

    let store = open_store()?;
    let term = admission_desk::add_waiver_term(store.connection(), &args[0], valid_until)?;

    match term.valid_until {
        Some(date) => println!("✓ Waiver term '{}' added (valid until {})", term.name, date),
        None => println!("✓ Waiver term '{}' added (open-ended)", term.name),
    }
    Ok(())
}

fn cmd_add_payment_term(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("Usage: admission-desk add-payment-term <name> <amount> [valid-until]");
    }
    let amount: f64 = args[1]
        .parse()
        .with_context(|| format!("Invalid amount '{}'", args[1]))?;
    let valid_until = args.get(2).map(|s| parse_date(s)).transpose()?;

    let store = open_store()?;
    let term =
        admission_desk::add_payment_term(store.connection(), &args[0], amount, valid_until)?;

    println!("✓ Payment term '{}' added ({:.2})", term.name, term.amount);
    Ok(())
}

fn cmd_terms() -> Result<()> {
    let store = open_store()?;
    let today = Utc::now().date_naive();

    let waiver_terms = admission_desk::current_waiver_terms(store.connection(), today)?;
    let payment_terms = admission_desk::current_payment_terms(store.connection(), today)?;

    println!("Waiver terms:");
    for term in &waiver_terms {
        match term.valid_until {
            Some(date) => println!("  {} (valid until {})", term.name, date),
            None => println!("  {} (open-ended)", term.name),
        }
    }
    if waiver_terms.is_empty() {
        println!("  (none)");
    }

    println!("Payment terms:");
    for term in &payment_terms {
        match term.valid_until {
            Some(date) => println!("  {} - {:.2} (valid until {})", term.name, term.amount, date),
            None => println!("  {} - {:.2} (open-ended)", term.name, term.amount),
        }
    }
    if payment_terms.is_empty() {
        println!("  (none)");
    }

    Ok(())
}

fn cmd_attendance(args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("Usage: admission-desk attendance <date>");
    }
    let date = parse_date(&args[0])?;

    let store = open_store()?;
    let entries = attendance_on(store.connection(), date)?;

    println!("Attendance for {}: {} sign-ins", date, entries.len());
    for entry in &entries {
        let name = entry.name.as_deref().unwrap_or("(not registered)");
        println!("  {}  {}  {}", entry.timestamp, entry.member_id, name);
    }

    Ok(())
}

fn cmd_history(args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("Usage: admission-desk history <id>");
    }
    let id = parse_id(&args[0])?;

    let store = open_store()?;
    let history = sign_ins_for_member(store.connection(), &id)?;

    println!("Sign-ins for {}: {}", id, history.len());
    for record in &history {
        let mark = if record.admitted { "✓" } else { "✗" };
        println!("  {} {}", mark, record.timestamp);
    }

    Ok(())
}
