use std::path::PathBuf;

use book_club::{
    book::{
        catalogue::{Catalogue, import_catalogue},
        delete_book, list_books,
    },
    config::Config,
    database::connect,
    group::{get_group, list_all_groups},
    progress::group_progress_stats,
    user::{create_user, delete_user, get_user_list},
    utils::{init_log, today},
};
use clap::Parser;

#[derive(Debug, clap::Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, default_value = "book_club.toml")]
    config: PathBuf,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    Book {
        #[command(subcommand)]
        command: BookCommand,
    },
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },
}

#[derive(Debug, clap::Subcommand)]
enum BookCommand {
    List {
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long)]
        genre: Option<String>,
    },
    /// Import books from a TOML catalogue
    Import { file: PathBuf },
    Delete { id: i64 },
}

#[derive(Debug, clap::Subcommand)]
enum UserCommand {
    List,
    Create {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    Delete { id: i64 },
}

#[derive(Debug, clap::Subcommand)]
enum GroupCommand {
    List,
    /// Print today's progress report of a group
    Stats { id: i64 },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:?}", e);
            return;
        }
    };
    let _guard = match init_log(config.log_dir.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{:?}", e);
            return;
        }
    };
    if let Err(e) = run(args.command, config).await {
        eprintln!("{:?}", e);
    }
}

async fn run(command: Commands, config: Config) -> anyhow::Result<()> {
    let database = connect(&config.database_url).await?;

    match command {
        Commands::Book { command } => match command {
            BookCommand::List { search, genre } => {
                for book in list_books(&database, search.as_deref(), genre.as_deref()).await? {
                    println!(
                        "{:<6} {:<40} {:<24} {:>5}p {:>3}ch",
                        book.id, book.title, book.author, book.total_pages, book.total_chapters
                    );
                }
            }
            BookCommand::Import { file } => {
                println!("Importing books from: {}", file.display());
                let catalogue = Catalogue::load(&file)?;
                let ids = import_catalogue(&database, &catalogue).await?;
                println!("Imported {} of {} books", ids.len(), catalogue.books.len());
            }
            BookCommand::Delete { id } => {
                delete_book(&database, id).await?;
                println!("Book deleted with id: {}", id);
            }
        },
        Commands::User { command } => match command {
            UserCommand::List => {
                for user in get_user_list(&database).await? {
                    println!("{:<6} {}", user.id, user.username);
                }
            }
            UserCommand::Create { username, password } => {
                let id = create_user(&database, &username, &password).await?;
                println!("User created with id: {}", id);
            }
            UserCommand::Delete { id } => {
                delete_user(&database, id).await?;
                println!("User deleted with id: {}", id);
            }
        },
        Commands::Group { command } => match command {
            GroupCommand::List => {
                for group in list_all_groups(&database).await? {
                    println!(
                        "{:<6} {:<30} {:<30} {} .. {} {:>2} members",
                        group.id,
                        group.name,
                        group.book_title,
                        group.start_date,
                        group.end_date,
                        group.member_count
                    );
                }
            }
            GroupCommand::Stats { id } => {
                let group = get_group(&database, id).await?;
                let report = group_progress_stats(&database, &group, today()).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        },
    }
    Ok(())
}
