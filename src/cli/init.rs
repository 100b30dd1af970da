use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path, Settings, DB_FILE};

pub fn run(data_dir: Option<String>) -> Result<()> {
    let settings = load_settings();
    let stdin = std::io::stdin();
    let settings = choose(settings, data_dir, &mut stdin.lock(), &mut std::io::stdout())?;
    save_settings(&settings)?;
    let resolved = create(&settings)?;
    println!("Initialized hearth at {}", resolved.display());
    Ok(())
}

/// Apply `--data-dir`, or ask for a directory on first run.
fn choose(
    mut settings: Settings,
    data_dir: Option<String>,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Settings> {
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    } else if settings.data_dir == Settings::default().data_dir {
        write!(output, "Data directory [{}]: ", settings.data_dir)?;
        output.flush()?;
        let mut line = String::new();
        input.read_line(&mut line)?;
        let chosen = line.trim();
        if !chosen.is_empty() {
            settings.data_dir = shellexpand_path(chosen);
        }
    }
    Ok(settings)
}

fn create(settings: &Settings) -> Result<PathBuf> {
    let resolved = PathBuf::from(&settings.data_dir);
    std::fs::create_dir_all(&resolved)?;
    let conn = get_connection(&resolved.join(DB_FILE))?;
    init_db(&conn)?;
    Ok(resolved)
}
