use crate::config::Config;
use crate::lang::Language;

pub fn list_languages(config: &Config) {
    let enabled = config.enabled_languages();

    println!("Supported languages:");
    for language in Language::SUPPORTED {
        let extensions: Vec<String> = language
            .extensions()
            .iter()
            .map(|ext| format!(".{}", ext))
            .collect();
        let status = if enabled.contains(&language) { "enabled" } else { "disabled" };
        println!("  {:<12} {:<20} {}", language.as_str(), extensions.join(" "), status);
    }
}
