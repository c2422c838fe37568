use std::path::PathBuf;
use std::time::Duration;

use color_eyre::eyre;
use structopt::StructOpt;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, sleep};
use tracing::{info, warn};

use estate_ticker::catalog::load_catalog;
use estate_ticker::logger::init_tracing;
use estate_ticker::{EngineConfig, MarketEngine, OrderBookSnapshot};

#[derive(Debug, StructOpt)]
#[structopt(name = "estate-ticker", about = "부동산 거래소 가상 시세 엔진")]
enum Command {
    /// 시세 루프를 돌리며 tick을 출력
    Run {
        #[structopt(long, parse(from_os_str), default_value = "data/catalog.json")]
        catalog: PathBuf,
        #[structopt(long, default_value = "10")]
        seconds: u64,
    },
    /// 종목 하나의 합성 호가창 출력
    Book {
        #[structopt(long, parse(from_os_str), default_value = "data/catalog.json")]
        catalog: PathBuf,
        #[structopt(long)]
        id: String,
    },
    /// 상세 화면 세션을 열고 표시 가격과 호가를 출력
    Detail {
        #[structopt(long, parse(from_os_str), default_value = "data/catalog.json")]
        catalog: PathBuf,
        #[structopt(long)]
        id: String,
        #[structopt(long, default_value = "5")]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // init error reporting
    color_eyre::install()?;

    dotenv::dotenv().ok();

    // init logging
    let _guards = init_tracing("logs", "estate-ticker")?;

    let config = EngineConfig::from_env()?;

    match Command::from_args() {
        Command::Run { catalog, seconds } => run(catalog, seconds, config).await,
        Command::Book { catalog, id } => book(catalog, &id, config),
        Command::Detail {
            catalog,
            id,
            seconds,
        } => detail(catalog, &id, seconds, config).await,
    }
}

async fn run(catalog: PathBuf, seconds: u64, config: EngineConfig) -> eyre::Result<()> {
    let engine = MarketEngine::new(load_catalog(&catalog)?, config)?;
    let mut ticks = engine.subscribe();

    engine.start().await;

    let deadline = sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C 수신, 종료합니다");
                break;
            }
            event = ticks.recv() => match event {
                Ok(event) => info!(
                    "{:<6} {:>16} {:?} {:+.2}% vol {:.1}",
                    event.instrument_id,
                    event.price,
                    event.direction,
                    event.change_rate,
                    event.volume
                ),
                Err(RecvError::Lagged(skipped)) => warn!("tick {}개를 놓쳤습니다", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.stop().await;

    let snapshot = engine.snapshot();
    info!("최종 스냅샷 (revision {})", snapshot.revision);
    for inst in snapshot.instruments.iter().take(10) {
        info!(
            "  {:<6} {:<20} {:>16} {:+.2}%",
            inst.id, inst.name, inst.price, inst.change_rate
        );
    }
    Ok(())
}

fn book(catalog: PathBuf, id: &str, config: EngineConfig) -> eyre::Result<()> {
    let engine = MarketEngine::new(load_catalog(&catalog)?, config)?;
    let instrument = engine.instrument(id)?;
    let book = engine.synthesize_order_book(id)?;

    info!("{} ({}) 현재가 {}", instrument.name, instrument.id, instrument.price);
    print_book(&book);
    Ok(())
}

async fn detail(catalog: PathBuf, id: &str, seconds: u64, config: EngineConfig) -> eyre::Result<()> {
    let engine = MarketEngine::new(load_catalog(&catalog)?, config)?;
    engine.start().await;

    let handle = engine.open_detail(id).await?;
    let mut ticker = interval(engine.config().detail_interval());
    for _ in 0..seconds {
        ticker.tick().await;
        let book = engine.detail_order_book(&handle)?;
        info!("표시 가격 {}", handle.display_price());
        print_book(&book);
    }

    engine.close_detail(&handle).await;
    engine.stop().await;
    Ok(())
}

fn print_book(book: &OrderBookSnapshot) {
    let max = book.max_quantity().max(1);
    for level in book.asks.iter().rev() {
        info!(
            "  ask {:>16} {:>8} {:+.2}% {}",
            level.price,
            level.quantity,
            level.change_rate_pct,
            depth_bar(level.quantity, max)
        );
    }
    for level in &book.bids {
        info!(
            "  bid {:>16} {:>8} {:+.2}% {}",
            level.price,
            level.quantity,
            level.change_rate_pct,
            depth_bar(level.quantity, max)
        );
    }
}

fn depth_bar(quantity: u64, max: u64) -> String {
    let width = (quantity * 20 / max) as usize;
    "#".repeat(width)
}
