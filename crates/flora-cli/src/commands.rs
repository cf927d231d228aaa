//! Subcommand handlers

use crate::cli::*;
use crate::error::{CliError, Result};
use crate::render;
use flora_api::{
    FamilyListParams, ImageUpload, NewFamily, NewPlant, NewTaxonomy,
    PlantListParams, PlantUpdate,
};
use flora_chat::{ChatBackend, ChatTarget, ConversationSession, Handoff, HistoryPager, SecretLookup};
use flora_store::FloraStore;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

pub async fn dispatch(command: Command, store: &Arc<FloraStore>, lookup: &SecretLookup) -> Result<()> {
    match command {
        Command::Identify { image, ask } => identify(store, lookup, &image, &ask).await,
        Command::Identifications { action } => identifications(store, action).await,
        Command::Plants { action } => plants(store, action).await,
        Command::Families { action } => families(store, action).await,
        Command::Taxonomies { action } => taxonomies(store, action).await,
        Command::Usage => {
            print!("{}", render::usage(&store.usage().await?));
            Ok(())
        }
        Command::Chat { action } => chat(store, action).await,
    }
}

async fn identify(
    store: &Arc<FloraStore>,
    lookup: &SecretLookup,
    image: &Path,
    questions: &[String],
) -> Result<()> {
    let upload = ImageUpload::from_path(image).await?;
    if !upload.is_image() {
        info!(content_type = %upload.content_type, "Uploading file with non-image type");
    }
    let identification = store.identify(upload).await?;
    print!("{}", render::identification(&identification));

    let mut handoff = Handoff::new(lookup.clone());
    let Some(target) = handoff.observe(&identification) else {
        if questions.is_empty() {
            return Ok(());
        }
        return Err(CliError::Usage(format!(
            "identification #{} has no chat secret",
            identification.id
        )));
    };

    if questions.is_empty() {
        println!("Chat available for identification #{}", identification.id);
        return Ok(());
    }

    let mut session = ConversationSession::new(store.clone());
    session.start(&target).await?;
    let mut printed = HashSet::new();
    for question in questions {
        session.send(question).await?;
        print_new_messages(&session, &mut printed);
    }
    Ok(())
}

async fn identifications(store: &FloraStore, action: IdentificationsAction) -> Result<()> {
    match action {
        IdentificationsAction::List { page, limit } => {
            let rows = store.identifications(page, limit).await?;
            for row in &rows.items {
                println!("{}", render::identification_row(row));
            }
            if let Some(footer) = render::page_footer(rows.page, rows.total, rows.limit) {
                println!("{}", footer);
            }
        }
        IdentificationsAction::Show { id } => {
            print!("{}", render::identification(&store.identification(id).await?));
        }
    }
    Ok(())
}

async fn plants(store: &FloraStore, action: PlantsAction) -> Result<()> {
    match action {
        PlantsAction::List {
            query,
            page,
            status,
        } => {
            let params = PlantListParams {
                page,
                status,
                query,
            };
            let plants = store.search_plants(&params).await?;
            if plants.items.is_empty() {
                println!("No plants found");
            }
            for plant in &plants.items {
                println!("{}", render::plant_row(plant));
            }
            if let Some(footer) = render::page_footer(plants.page, plants.total, plants.limit) {
                println!("{}", footer);
            }
        }
        PlantsAction::Show { id } => {
            print!("{}", render::plant_detail(&store.plant(id).await?));
        }
        PlantsAction::Create { fields, image } => {
            let image = match image {
                Some(path) => Some(ImageUpload::from_path(&path).await?),
                None => None,
            };
            let plant = store
                .create_plant(NewPlant {
                    scientific_name: fields.name,
                    common_names: fields.common_names,
                    taxonomy_id: fields.taxonomy_id,
                    family_id: fields.family_id,
                    image,
                })
                .await?;
            print!("{}", render::plant_detail(&plant));
        }
        PlantsAction::Update {
            id,
            name,
            common_names,
            taxonomy_id,
            family_id,
        } => {
            let current = store
                .plant_for_edit(Some(id))
                .await?
                .ready()
                .ok_or_else(|| CliError::Usage(format!("plant #{} is not available", id)))?;
            let update = PlantUpdate {
                scientific_name: name.unwrap_or(current.scientific_name),
                common_names: if common_names.is_empty() {
                    current.common_names
                } else {
                    common_names
                },
                taxonomy_id: taxonomy_id.unwrap_or(current.taxonomy_id),
                family_id: family_id.or(current.family_id),
            };
            let plant = store.update_plant(id, &update).await?;
            print!("{}", render::plant_detail(&plant));
        }
        PlantsAction::Status { id, status } => {
            store.set_plant_status(id, status).await?;
            println!("Plant #{} is now {}", id, status);
        }
    }
    Ok(())
}

async fn families(store: &FloraStore, action: FamiliesAction) -> Result<()> {
    match action {
        FamiliesAction::List { query, page } => {
            let families = store.families(&FamilyListParams { query, page }).await?;
            for family in &families.items {
                println!("{}", render::family_row(family));
            }
            if let Some(footer) = render::page_footer(families.page, families.total, families.limit)
            {
                println!("{}", footer);
            }
        }
        FamiliesAction::Create { name, description } => {
            let family = store.create_family(&NewFamily { name, description }).await?;
            println!("{}", render::family_row(&family));
        }
        FamiliesAction::Update {
            id,
            name,
            description,
        } => {
            let family = store
                .update_family(id, &NewFamily { name, description })
                .await?;
            println!("{}", render::family_row(&family));
        }
        FamiliesAction::Status { id, state } => {
            store
                .set_family_status(id, state == Activity::Active)
                .await?;
            println!("Family #{} is now {:?}", id, state);
        }
    }
    Ok(())
}

fn new_taxonomy(fields: TaxonomyFields) -> NewTaxonomy {
    NewTaxonomy {
        family_id: fields.family_id,
        kingdom: fields.kingdom,
        phylum: fields.phylum,
        class: fields.class,
        order: fields.order,
        genus: fields.genus,
        species: fields.species,
        rank: fields.rank,
    }
}

async fn taxonomies(store: &FloraStore, action: TaxonomiesAction) -> Result<()> {
    match action {
        TaxonomiesAction::List { family_id } => {
            let taxonomies = store.taxonomies(family_id).await?;
            if taxonomies.is_empty() {
                println!("No taxonomies found");
            }
            for taxonomy in &taxonomies {
                println!("{}", render::taxonomy_row(taxonomy));
            }
        }
        TaxonomiesAction::Create { fields } => {
            let taxonomy = store.create_taxonomy(&new_taxonomy(fields)).await?;
            println!("{}", render::taxonomy_row(&taxonomy));
        }
        TaxonomiesAction::Update { id, fields } => {
            let taxonomy = store.update_taxonomy(id, &new_taxonomy(fields)).await?;
            println!("{}", render::taxonomy_row(&taxonomy));
        }
    }
    Ok(())
}

async fn chat(store: &Arc<FloraStore>, action: ChatAction) -> Result<()> {
    match action {
        ChatAction::Start {
            identification_id,
            secret,
        } => {
            let target = ChatTarget::new(&identification_id, &secret).ok_or_else(|| {
                CliError::Usage("identification id and secret are both required".to_string())
            })?;
            let stdin = BufReader::new(tokio::io::stdin());
            interactive(store.clone(), &target, stdin).await
        }
        ChatAction::Show { id } => {
            let conversation = store.conversation(id).await?;
            println!(
                "Conversation #{} for identification {} ({} credits used)",
                conversation.id, conversation.identification_id, conversation.credits_used
            );
            for message in &conversation.messages {
                println!("{}", render::message(message));
            }
            Ok(())
        }
        ChatAction::History { id, page, limit } => {
            let mut pager = HistoryPager::new(id).with_limit(limit).with_page(page);
            let history = pager.load(store.as_ref()).await?;
            for message in &history.items {
                println!("{}", render::message(message));
            }
            let params = pager.params();
            if let Some(footer) = render::page_footer(params.page, history.total, params.limit) {
                println!("{}", footer);
            }
            Ok(())
        }
        ChatAction::Send { id, text } => {
            let exchange = store.send_message(id, &text).await?;
            println!("{}", render::message(&exchange.user_message));
            println!("{}", render::message(&exchange.bot_message));
            Ok(())
        }
    }
}

/// Chat loop: one message per input line until end of input or `/quit`.
/// A failed send is reported and the loop continues.
async fn interactive<B, R>(backend: B, target: &ChatTarget, input: R) -> Result<()>
where
    B: ChatBackend,
    R: AsyncBufRead + Unpin,
{
    let mut session = ConversationSession::new(backend);
    let conversation_id = session.start(target).await?;
    println!("Conversation #{} started. Type /quit to leave.", conversation_id);

    let mut printed = HashSet::new();
    print_new_messages(&session, &mut printed);

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if session.send(line).await.is_err() {
            if let Some(message) = session.send_error() {
                eprintln!("error: {}", message);
            }
            continue;
        }
        print_new_messages(&session, &mut printed);
    }
    Ok(())
}

fn print_new_messages<B: ChatBackend>(session: &ConversationSession<B>, printed: &mut HashSet<u64>) {
    for message in session.messages() {
        if printed.insert(message.id) {
            println!("{}", render::message(message));
        }
    }
}
