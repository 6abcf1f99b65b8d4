//! # QR Subcommand
//!
//! Re-renders stored QR images from the *current* base URL. Run after
//! changing `BASE_URL` so printed stickers and cached images agree again.
//! The stored URL snapshot of each record is left untouched.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use legal_api::config::{DEFAULT_BASE_URL, DEFAULT_DATABASE_URL, DEFAULT_QR_STORAGE_DIR};
use legal_api::images::ImageService;
use legal_api::store::{RecordQuery, RecordStore};
use legal_core::{BaseUrl, Identifier, Record};
use legal_qr::{QrImageStore, QrRenderer};

use crate::db::open_store;

const PAGE_SIZE: u32 = 100;

/// Arguments for `legal qr`.
#[derive(Args, Debug)]
pub struct QrArgs {
    #[command(subcommand)]
    pub command: QrCommand,
}

/// QR subcommands.
#[derive(Subcommand, Debug)]
pub enum QrCommand {
    /// Re-render images under the current base URL.
    Regenerate(RegenerateArgs),
}

/// Arguments for `legal qr regenerate`.
#[derive(Args, Debug)]
pub struct RegenerateArgs {
    /// Every record in the database.
    #[arg(long, conflicts_with = "code", required_unless_present = "code")]
    pub all: bool,

    /// A single record by identifier.
    #[arg(long, value_name = "CODE")]
    pub code: Option<String>,

    /// sqlx SQLite connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// Directory holding rendered images.
    #[arg(long, env = "QR_STORAGE_DIR", default_value = DEFAULT_QR_STORAGE_DIR)]
    pub qr_storage_dir: PathBuf,

    /// Base of the verification URL.
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
}

/// Execute the qr subcommand.
pub fn run_qr(args: &QrArgs) -> Result<u8> {
    match &args.command {
        QrCommand::Regenerate(args) => crate::runtime()?.block_on(regenerate(args)),
    }
}

async fn regenerate(args: &RegenerateArgs) -> Result<u8> {
    let base_url = BaseUrl::new(args.base_url.as_str()).context("invalid base URL")?;
    let store = open_store(&args.database_url).await?;
    let images = ImageService::new(
        QrRenderer::default(),
        QrImageStore::new(&args.qr_storage_dir),
        base_url,
    );

    let records = match (&args.code, args.all) {
        (Some(code), _) => {
            let identifier = Identifier::new(code.trim()).context("invalid code")?;
            match store.get_by_identifier(&identifier).await? {
                Some(record) => vec![record],
                None => {
                    eprintln!("NOT FOUND: {identifier}");
                    return Ok(1);
                }
            }
        }
        (None, true) => all_records(&store).await?,
        (None, false) => bail!("either --all or --code is required"),
    };

    let mut failed = 0usize;
    for record in &records {
        if let Err(e) = images.regenerate(record).await {
            tracing::error!(identifier = %record.identifier, error = %e, "regeneration failed");
            failed += 1;
        }
    }

    println!(
        "OK: regenerated {} of {} images in {}",
        records.len() - failed,
        records.len(),
        args.qr_storage_dir.display()
    );
    Ok(u8::from(failed > 0))
}

async fn all_records(store: &dyn RecordStore) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut query = RecordQuery {
        limit: PAGE_SIZE,
        ..RecordQuery::default()
    };
    loop {
        let page = store.list(&query).await?;
        let done = page.items.len() < PAGE_SIZE as usize;
        records.extend(page.items);
        if done {
            return Ok(records);
        }
        query.page += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use legal_api::store::NewRecord;
    use legal_core::{encode_verification_url, RecordFields};

    const CODE: &str = "zVtgAi18NOlvLivHYMjj";

    fn decode(path: &std::path::Path) -> String {
        let img = image::open(path).unwrap().to_luma8();
        let (w, h) = img.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
                img.get_pixel(x as u32, y as u32).0[0]
            });
        prepared.detect_grids()[0].decode().unwrap().1
    }

    #[test]
    fn regenerates_under_new_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let database_url = format!("sqlite://{}", dir.path().join("r.db").display());
        let images = dir.path().join("qrcodes");
        let rt = crate::runtime().unwrap();

        rt.block_on(async {
            let store = open_store(&database_url).await.unwrap();
            let identifier = Identifier::new(CODE).unwrap();
            let old = BaseUrl::new("http://localhost:3000").unwrap();
            store
                .insert_unique(NewRecord {
                    encoded_url: encode_verification_url(&identifier, &old),
                    identifier,
                    fields: RecordFields {
                        legalization_no: "LEG-1".into(),
                        issue_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                        place_of_issue: None,
                        legalization_type: "Apostille".into(),
                        authorized_officer: "Consul".into(),
                        document_owner: "Owner".into(),
                        document_type: "Deed".into(),
                    },
                    created_by: None,
                })
                .await
                .unwrap();
        });

        let args = QrArgs {
            command: QrCommand::Regenerate(RegenerateArgs {
                all: true,
                code: None,
                database_url: database_url.clone(),
                qr_storage_dir: images.clone(),
                base_url: "https://legal.example.org".into(),
            }),
        };
        assert_eq!(run_qr(&args).unwrap(), 0);
        assert_eq!(
            decode(&images.join(format!("{CODE}.png"))),
            format!("https://legal.example.org/check/sticker?qr={CODE}")
        );

        let missing = QrArgs {
            command: QrCommand::Regenerate(RegenerateArgs {
                all: false,
                code: Some("ZZZZZZZZZZZZZZZZZZZZ".into()),
                database_url,
                qr_storage_dir: images,
                base_url: "https://legal.example.org".into(),
            }),
        };
        assert_eq!(run_qr(&missing).unwrap(), 1);
    }
}
