use foldergrid_analyzer::report::format_report;

use crate::app::App;

pub fn scan(app: &App, folder: &str) -> anyhow::Result<()> {
    let scan = app.scanner.scan(folder)?;
    for entry in &scan.entries {
        let marker = if entry.is_directory { "/" } else { "" };
        println!("{:>10}  {}{marker}", entry.size, entry.relative_path);
    }
    for warning in &scan.warnings {
        eprintln!("warning: {warning}");
    }
    println!(
        "{} entries, fingerprint {}",
        scan.entries.len(),
        scan.fingerprint()
    );
    Ok(())
}

pub fn detect(app: &App, folder: &str, json: bool) -> anyhow::Result<()> {
    let detection = app.topology.reanalyze(folder)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&detection)?);
    } else {
        println!("{}", format_report(&detection));
    }
    Ok(())
}
