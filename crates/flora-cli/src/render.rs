//! Plain text rendering of API results for the terminal

use flora_api::{
    CreditWindow, Family, Identification, IdentificationSummary, Message, Pagination, Plant,
    Taxonomy, UsageSnapshot,
};

fn percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

/// Lines joined into a block that ends with a newline
fn block(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub fn identification(ident: &Identification) -> String {
    let mut lines = vec![format!(
        "Identification #{} (confidence {})",
        ident.id,
        percent(ident.confidence)
    )];

    let response = ident.api_response.as_ref();
    match response.and_then(|r| r.best_suggestion()) {
        Some(best) => {
            lines.push(format!("Best match: {} ({}%)", best.plant_name, best.percent()));
            if !best.common_names().is_empty() {
                lines.push(format!("  Common names: {}", best.common_names().join(", ")));
            }
            if let Some(details) = &best.plant_details {
                let ranks = [
                    ("Family", details.taxonomy.family.as_deref()),
                    ("Genus", details.taxonomy.genus.as_deref()),
                ];
                for (label, value) in ranks {
                    if let Some(value) = value {
                        lines.push(format!("  {}: {}", label, value));
                    }
                }
                if let Some(wiki) = &details.wiki_description {
                    lines.push(format!("  {}", wiki.value));
                }
            }
        }
        None => lines.push("No suggestions".to_string()),
    }

    let others = response.map(|r| r.other_suggestions()).unwrap_or(&[]);
    if !others.is_empty() {
        lines.push("Other suggestions:".to_string());
        for suggestion in others {
            lines.push(format!("  - {} ({}%)", suggestion.plant_name, suggestion.percent()));
        }
    }

    if let Some(plant) = &ident.plant {
        lines.push(format!("Catalog plant: #{} {}", plant.id, plant.scientific_name));
    }
    if let Some(family) = &ident.family {
        lines.push(format!("Catalog family: #{} {}", family.id, family.name));
    }
    block(lines)
}

pub fn identification_row(row: &IdentificationSummary) -> String {
    format!("{:>6}  {}", row.id, percent(row.confidence))
}

pub fn plant_row(plant: &Plant) -> String {
    let line = format!(
        "{:>6}  {:<8}  {}",
        plant.id, plant.status, plant.scientific_name
    );
    if plant.common_names.is_empty() {
        line
    } else {
        format!("{} ({})", line, plant.common_names.join(", "))
    }
}

pub fn plant_detail(plant: &Plant) -> String {
    let mut lines = vec![
        format!("Plant #{}: {}", plant.id, plant.scientific_name),
        format!("  Status: {}", plant.status),
    ];
    if !plant.common_names.is_empty() {
        lines.push(format!("  Common names: {}", plant.common_names.join(", ")));
    }
    lines.push(format!("  Taxonomy: #{}", plant.taxonomy_id));
    match (plant.family_id, plant.family_name()) {
        (Some(id), Some(name)) => lines.push(format!("  Family: #{} {}", id, name)),
        (Some(id), None) => lines.push(format!("  Family: #{}", id)),
        (None, Some(name)) => lines.push(format!("  Family: {}", name)),
        (None, None) => {}
    }
    if plant.has_family_mismatch() {
        lines.push("  Warning: family id does not match the plant's taxonomy".to_string());
    }
    lines.extend(plant.images.iter().map(|image| format!("  Image: {}", image)));
    block(lines)
}

pub fn family_row(family: &Family) -> String {
    let state = if family.active { "active" } else { "inactive" };
    let line = format!("{:>6}  {:<8}  {}", family.id, state, family.name);
    match family.description.as_deref().filter(|d| !d.is_empty()) {
        Some(description) => format!("{} - {}", line, description),
        None => line,
    }
}

pub fn taxonomy_row(taxonomy: &Taxonomy) -> String {
    format!(
        "{:>6}  family #{:<4}  {:<10}  {}",
        taxonomy.id,
        taxonomy.family_id,
        taxonomy.rank.as_deref().unwrap_or("-"),
        taxonomy.label()
    )
}

pub fn message(message: &Message) -> String {
    format!("[{}] {}", message.role, message.content)
}

fn credit_window(label: &str, window: &CreditWindow) -> String {
    let fmt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
    format!(
        "{:<10} day {:>6}  week {:>6}  month {:>6}  total {:>6}",
        label,
        fmt(window.day),
        fmt(window.week),
        fmt(window.month),
        window.total
    )
}

pub fn usage(usage: &UsageSnapshot) -> String {
    let credits = match (
        usage.can_use_credits.value,
        usage.can_use_credits.reason.as_deref(),
    ) {
        (true, _) => "Credits available".to_string(),
        (false, Some(reason)) => format!("Credits unavailable: {}", reason),
        (false, None) => "Credits unavailable".to_string(),
    };
    block(vec![
        format!("Active: {}", if usage.active { "yes" } else { "no" }),
        credit_window("Limits", &usage.credit_limits),
        credit_window("Used", &usage.used),
        credit_window("Remaining", &usage.remaining),
        credits,
    ])
}

/// "Page 2 of 3 (57 total)", or nothing when everything fits on one page
pub fn page_footer(page: u32, total: u64, limit: u32) -> Option<String> {
    let pagination = Pagination::new(page, total, limit);
    pagination
        .is_visible()
        .then(|| format!("Page {} of {} ({} total)", page, pagination.page_count(), total))
}
