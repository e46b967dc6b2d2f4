use std::path::PathBuf;

use glam::{Vec2, Vec3};
use placeit_lib::assets::{AssetResolver, FsAssetLibrary};
use placeit_lib::fixtures;
use placeit_lib::harness::SessionHarness;
use placeit_lib::state::{PlacementSettings, SessionEvent};
use placeit_lib::store::RoomStore;
use shared::{AnchorKind, RoomId, RoomType};

type CliResult = Result<(), Box<dyn std::error::Error>>;

const USAGE: &str = "\
usage: placeit [--rooms <dir>] <command>

commands:
  rooms                     list stored rooms
  inspect <id>              show a room's saved anchors and objects
  create <name> <type>      create an empty room
  delete <id>               delete a room
  demo <name>               arrange sample furniture headlessly and save it as a room
  models <dir>              list OBJ models and texture sets under a directory
  config                    print the settings path and effective settings";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "placeit=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(args).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(mut args: Vec<String>) -> CliResult {
    let settings = PlacementSettings::load();
    let rooms_dir = match take_flag(&mut args, "--rooms") {
        Some(dir) => PathBuf::from(dir),
        None => settings
            .rooms_dir()
            .ok_or("no data directory available; pass --rooms <dir>")?,
    };

    let command: Vec<&str> = args.iter().map(String::as_str).collect();
    match command.as_slice() {
        ["rooms"] | ["list"] => list_rooms(&RoomStore::open(&rooms_dir)?),
        ["inspect", id] => inspect(&RoomStore::open(&rooms_dir)?, parse_id(id)?),
        ["create", name, room_type] => {
            let room_type = RoomType::parse(room_type).ok_or_else(|| {
                let known: Vec<&str> = RoomType::all().iter().map(|t| t.display_name()).collect();
                format!("unknown room type {room_type:?}; expected one of {}", known.join(", "))
            })?;
            let room = RoomStore::open(&rooms_dir)?.create(name, room_type)?;
            println!("{}", room.id);
            Ok(())
        }
        ["delete", id] => Ok(RoomStore::open(&rooms_dir)?.delete(parse_id(id)?)?),
        ["demo", name] => demo(&rooms_dir, name).await,
        ["models", dir] => list_models(&FsAssetLibrary::new(dir)),
        ["config"] => {
            match PlacementSettings::config_path() {
                Some(path) => println!("settings file: {}", path.display()),
                None => println!("settings file: (no config directory)"),
            }
            println!("rooms directory: {}", rooms_dir.display());
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        _ => Err(USAGE.into()),
    }
}

/// Remove `flag <value>` from the argument list, returning the value
fn take_flag(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let index = args.iter().position(|a| a == flag)?;
    if index + 1 >= args.len() {
        args.remove(index);
        return None;
    }
    let value = args.remove(index + 1);
    args.remove(index);
    Some(value)
}

fn parse_id(value: &str) -> Result<RoomId, String> {
    value
        .parse()
        .map_err(|e| format!("invalid room id {value:?}: {e}"))
}

fn list_rooms(store: &RoomStore) -> CliResult {
    let rooms = store.list_all()?;
    if rooms.is_empty() {
        println!("no rooms in {}", store.dir().display());
    }
    for room in rooms {
        let state = if room.is_archived() { "saved" } else { "empty" };
        println!("{}  {:<24} {:<12} {}", room.id, room.name, room.room_type, state);
    }
    Ok(())
}

fn inspect(store: &RoomStore, id: RoomId) -> CliResult {
    let room = store.load(id)?;
    println!("{} ({}, schema v{})", room.name, room.room_type, room.version);
    if !room.is_archived() {
        println!("  not saved yet");
        return Ok(());
    }

    let map = room.world_map()?;
    let (mut planes, mut objects, mut snapshots) = (0, 0, 0);
    for anchor in &map.anchors {
        match anchor.kind {
            AnchorKind::Plane { .. } => planes += 1,
            AnchorKind::Object => objects += 1,
            AnchorKind::Snapshot { .. } => snapshots += 1,
        }
    }
    println!(
        "  world map: {} feature points, {} planes, {} object anchors, {} snapshot",
        map.feature_points.len(),
        planes,
        objects,
        snapshots
    );

    let archive = room.objects()?;
    println!("  objects: {}", archive.objects.len());
    for record in &archive.objects {
        let p = record.anchor_transform.w_axis;
        println!(
            "    {}  {:<28} at ({:.2}, {:.2}, {:.2}) yaw {:.2} texture {}",
            record.id,
            record.model,
            p.x,
            p.y,
            p.z,
            record.yaw,
            record.texture.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn list_models(library: &FsAssetLibrary) -> CliResult {
    let models = library.list_models();
    if models.is_empty() {
        println!("no models under {}", library.root().display());
    }
    for model in models {
        match library.resolve(&model) {
            Ok(asset) => {
                let size = asset.bounds.size();
                let sets: Vec<String> = library.texture_sets(&model).into_iter().map(|s| s.id).collect();
                println!(
                    "{:<32} {:.2} x {:.2} x {:.2}  nodes {}  textures [{}]",
                    model,
                    size.x,
                    size.y,
                    size.z,
                    asset.nodes.len(),
                    sets.join(", ")
                );
            }
            Err(e) => println!("{:<32} error: {}", model, e),
        }
    }
    Ok(())
}

/// Drive a headless session over the sample catalog: place a table with two
/// chairs, copy one, and save the result as a new room
async fn demo(rooms_dir: &std::path::Path, name: &str) -> CliResult {
    let mut harness = SessionHarness::new(rooms_dir)?;
    let room = harness.session.store().create(name, RoomType::DiningRoom)?;
    harness.session.enter_room(room);
    harness.start_with_floor(Vec2::new(8.0, 8.0)).await;

    harness.place(fixtures::TABLE, Vec3::ZERO).await;
    harness.place(fixtures::CHAIR, Vec3::new(-0.9, 0.0, 0.0)).await;
    if let Some(chair) = harness.place(fixtures::CHAIR, Vec3::new(0.0, 0.0, 0.9)).await {
        harness.tap_world(Vec3::new(0.2, 0.0, 0.9));
        harness.session.did_select_texture("Walnut");
        harness.tap_action(placeit_lib::scene::PanelAction::Copy);
        harness.settle().await;
        tracing::debug!("Copied chair {}", chair);
    }

    harness.session.save_experience();
    harness.settle().await;
    for event in harness.session.take_events() {
        match event {
            SessionEvent::ExperienceSaved(id) => {
                println!("saved {} objects to room {}", harness.object_count(), id);
                return Ok(());
            }
            SessionEvent::SaveFailed(message) => return Err(message.into()),
            _ => {}
        }
    }
    Err("save did not complete".into())
}
