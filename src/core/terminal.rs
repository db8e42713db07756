use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static SHIELD: Emoji<'_, '_> = Emoji("🛡️  ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_banner() {
    println!();
    println!("{}{}", SHIELD, style("vigil").bold().cyan());
    println!("  {}", style("home security controller").dim());
    println!();
}

pub fn print_goodbye() {
    println!("\n{} {}", SHIELD, style("vigil stopped. Stay safe.").dim());
}
