//! `menu-sync [branch-id]`
//!
//! Loads the menu from the configured store and prints the restaurant
//! header followed by either the branch list or one branch's menu.

use anyhow::{bail, Context};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

use menu_sync::diagnostics::{init_logging, BUILD_INFO};
use menu_sync::{
    Branch, Branding, Config, Dish, HttpStore, MemoryStore, MenuSection, MenuSynchronizer,
    RemoteStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    // Dropping the guard flushes the file writer.
    let _log_guard = init_logging(config.log_dir.as_deref());

    info!(
        git_sha = BUILD_INFO.git_sha,
        built = BUILD_INFO.built_at,
        os = BUILD_INFO.target.0,
        arch = BUILD_INFO.target.1,
        "Starting menu-sync v{}",
        BUILD_INFO.version
    );

    let store: Arc<dyn RemoteStore> = match &config.db_file {
        Some(path) => {
            info!(path = %path.display(), "serving menu from local database file");
            Arc::new(
                MemoryStore::from_file(path)
                    .with_context(|| format!("cannot read {}", path.display()))?,
            )
        }
        None => {
            info!(url = %config.api_url, "using menu API");
            Arc::new(HttpStore::new(&config.api_url, config.timeout)?)
        }
    };

    let sync = MenuSynchronizer::new(store);
    sync.initialize().await.context("failed to load the menu")?;

    let snapshot = sync.snapshot();
    let mut out = render_header(snapshot.branding.as_ref());
    match std::env::args().nth(1) {
        None => out.push_str(&render_branches(&snapshot.branches)),
        Some(branch_id) => {
            let Some(branch) = snapshot.branches.iter().find(|b| b.id == branch_id) else {
                bail!("unknown branch {branch_id}");
            };
            out.push_str(&render_menu(branch, &sync.menu_for_branch(&branch.id)));
        }
    }
    print!("{out}");
    Ok(())
}

fn render_header(branding: Option<&Branding>) -> String {
    let mut out = String::new();
    let Some(branding) = branding else {
        return out;
    };
    let _ = writeln!(out, "{}", branding.restaurant_name);
    if let Some(slogan) = branding.slogan.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(out, "{slogan}");
    }
    if let Some(welcome) = branding.welcome_text.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(out, "{welcome}");
    }
    out.push('\n');
    out
}

fn render_branches(branches: &[Branch]) -> String {
    if branches.is_empty() {
        return "No branches yet.\n".to_string();
    }
    let mut out = String::new();
    for branch in branches {
        let _ = writeln!(
            out,
            "[{}] {} | {} | {}",
            branch.id, branch.name, branch.address, branch.phone
        );
    }
    out
}

fn render_menu(branch: &Branch, sections: &[MenuSection]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", branch.name, branch.address);
    if sections.is_empty() {
        out.push_str("The menu is empty.\n");
        return out;
    }
    for section in sections {
        let _ = writeln!(out, "\n== {} ==", section.category.name);
        for dish in &section.dishes {
            out.push_str(&render_dish(dish));
        }
    }
    out
}

fn render_dish(dish: &Dish) -> String {
    let mut out = String::new();
    let star = if dish.is_featured { " *" } else { "" };
    let _ = writeln!(out, "  {}{star}  {}", dish.name, format_price(dish.price));
    for variant in &dish.variants {
        let _ = writeln!(out, "      {}  {}", variant.name, format_price(variant.price));
    }
    out
}

/// Whole currency units with space-separated thousands.
fn format_price(price: f64) -> String {
    let digits = (price.round() as i64).unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    if price < -0.5 {
        grouped.insert(0, '-');
    }
    grouped
}
