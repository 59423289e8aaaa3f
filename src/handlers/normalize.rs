use anyhow::Result;
use console::{Term, style};
use sharefetch::ShareLink;
use sharefetch::link::normalize;
use std::process;

pub fn handle_normalize(raw: &str) -> Result<()> {
    let term = Term::stdout();

    match ShareLink::parse(raw) {
        Ok(link) => {
            term.write_line(&link.to_string())?;
            term.write_line(&format!(
                "{} Valid share link (id: {})",
                style("✅").green(),
                style(link.share_id()).cyan()
            ))?;
        }
        Err(e) => {
            term.write_line(&normalize(raw))?;
            term.write_line(&format!("{} {}", style("❌").red(), e))?;
            process::exit(1);
        }
    }

    Ok(())
}
