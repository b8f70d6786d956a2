use std::path::PathBuf;
use std::process;

use clap::{Arg, ArgAction, Command};
use exhume_oct::{read_fundus_images, read_oct_volumes, FundusImage, OctVolume};

fn main() {
    env_logger::init();

    let matches = Command::new("exhume_oct")
        .version(env!("CARGO_PKG_VERSION"))
        .author("k1nd0ne")
        .about("Extracts OCT volumes and fundus images from Heidelberg .e2e files.")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_parser(clap::value_parser!(PathBuf))
                .required(true)
                .help("Path to the .e2e file."),
        )
        .arg(
            Arg::new("what")
                .short('w')
                .long("what")
                .value_parser(["volumes", "fundus"])
                .default_value("volumes")
                .help("Which entity kind to extract."),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the parsed entities as JSON instead of a summary."),
        )
        .get_matches();

    let input = matches.get_one::<PathBuf>("input").expect("required");
    let what = matches
        .get_one::<String>("what")
        .map(String::as_str)
        .unwrap_or("volumes");
    let json = matches.get_flag("json");

    let result = match what {
        "volumes" => read_oct_volumes(input).map(Output::Volumes),
        "fundus" => read_fundus_images(input).map(Output::Fundus),
        _ => unreachable!("clap restricts `what` to known values"),
    };

    match result {
        Ok(output) => output.print(json),
        Err(err) => {
            log::error!("{err}");
            eprintln!("Error: {err}");
            process::exit(1);
        }
    }
}

enum Output {
    Volumes(Vec<OctVolume>),
    Fundus(Vec<FundusImage>),
}

impl Output {
    fn print(&self, json: bool) {
        match self {
            Output::Volumes(volumes) => print_volumes(volumes, json),
            Output::Fundus(images) => print_fundus(images, json),
        }
    }
}

fn print_volumes(volumes: &[OctVolume], json: bool) {
    if json {
        match serde_json::to_string_pretty(volumes) {
            Ok(text) => println!("{text}"),
            Err(e) => log::error!("could not serialize volumes: {e}"),
        }
        return;
    }

    println!("Found {} OCT volume(s):", volumes.len());
    for volume in volumes {
        println!(
            "  {} — {} slice(s), laterality: {:?}, acquired: {:?}",
            volume.volume_id,
            volume.num_slices(),
            volume.laterality,
            volume.acquisition_date,
        );
    }
}

fn print_fundus(images: &[FundusImage], json: bool) {
    if json {
        match serde_json::to_string_pretty(images) {
            Ok(text) => println!("{text}"),
            Err(e) => log::error!("could not serialize fundus images: {e}"),
        }
        return;
    }

    println!("Found {} fundus image(s):", images.len());
    for image in images {
        println!(
            "  {} — {}x{}, laterality: {:?}",
            image.image_id, image.image.width, image.image.height, image.laterality
        );
    }
}
