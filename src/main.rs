//! catalog-migrate 命令行入口

use anyhow::Context;
use catalog_core::{Product, ProductQuery};
use catalog_migrate_lib::commands::{self, SchemaOverview};
use catalog_migrate_lib::config::{self, AppConfig};
use catalog_migrate_lib::logger;
use catalog_migrate_lib::{CatalogStats, MigrationReport, VerificationReport};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "catalog-migrate")]
#[command(about = "把商品表的 department 文本列规范化为 departments 表")]
#[command(version)]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 数据库文件，覆盖配置
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// 备份目录，覆盖配置
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 只输出错误
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 备份后执行完整迁移
    Migrate {
        #[arg(long)]
        json: bool,
    },

    /// 只创建并校验备份
    Backup,

    /// 显示当前表结构
    Schema,

    /// 检查已迁移的数据库
    Verify {
        #[arg(long)]
        json: bool,
    },

    /// 目录统计
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// 分页列出商品
    Products(ProductsArgs),

    /// 按名称、品牌或分类搜索商品
    Search {
        query: String,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ProductsArgs {
    #[arg(long)]
    page: Option<u32>,

    /// 每页数量（1-100）
    #[arg(long)]
    per_page: Option<u32>,

    #[arg(long)]
    department: Option<String>,

    /// 只列出该部门 ID 的商品（按名称排序）
    #[arg(long, conflicts_with = "department")]
    department_id: Option<i64>,

    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    brand: Option<String>,

    #[arg(long)]
    min_price: Option<f64>,

    #[arg(long)]
    max_price: Option<f64>,

    #[arg(long)]
    json: bool,
}

impl From<&ProductsArgs> for ProductQuery {
    fn from(args: &ProductsArgs) -> Self {
        ProductQuery {
            page: args.page,
            per_page: args.per_page,
            department: args.department.clone(),
            category: args.category.clone(),
            brand: args.brand.clone(),
            min_price: args.min_price,
            max_price: args.max_price,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load_config(cli.config.as_deref())
        .context("加载配置失败")?
        .with_overrides(cli.database, cli.backup_dir);

    logger::init_logging(&config.logging, cli.verbose, cli.quiet)?;
    tracing::debug!("[配置] 数据库: {}", config.database.path.display());

    match cli.command {
        Commands::Migrate { json } => handle_migrate(&config, json),
        Commands::Backup => {
            let path = commands::backup(&config)?;
            println!("备份已创建: {}", path.display());
            Ok(())
        }
        Commands::Schema => {
            print_schema(&commands::schema(&config)?);
            Ok(())
        }
        Commands::Verify { json } => handle_verify(&config, json),
        Commands::Stats { json } => {
            let stats = commands::stats(&config)?;
            if json {
                print_json(&stats)
            } else {
                print_stats(&stats);
                Ok(())
            }
        }
        Commands::Products(args) => {
            let page =
                commands::products(&config, args.department_id, &ProductQuery::from(&args))?;
            if args.json {
                return print_json(&page);
            }
            println!(
                "第 {}/{} 页，共 {} 条",
                page.page, page.total_pages, page.total
            );
            page.items.iter().for_each(print_product);
            Ok(())
        }
        Commands::Search { query, json } => {
            let products = commands::search(&config, &query)?;
            if json {
                return print_json(&products);
            }
            println!("\"{}\" 共找到 {} 条", query, products.len());
            products.iter().for_each(print_product);
            Ok(())
        }
    }
}

fn print_product(product: &Product) {
    println!(
        "  {:>6}  {:<40} {:<8} {:<16} ${:.2}",
        product.id,
        product.name.as_deref().unwrap_or("-"),
        product.department,
        product.category,
        product.retail_price
    );
}

fn handle_migrate(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let report: MigrationReport = commands::migrate(config)?;
    if json {
        return print_json(&report);
    }
    println!("迁移完成");
    println!("  备份: {}", report.backup_path.display());
    println!(
        "  部门: {} (新写入 {})",
        report.departments.join(", "),
        report.inserted_departments
    );
    println!("  商品: {}", report.migrated_products);
    Ok(())
}

fn handle_verify(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let report: VerificationReport = commands::verify(config)?;
    if json {
        print_json(&report)?;
    } else {
        println!("部门数: {}", report.department_count);
        println!("商品数: {}", report.product_count);
        println!("有效外键关联: {}", report.joined_products);
        for (department, count) in &report.per_department {
            println!("  {department}: {count}");
        }
        for mismatch in &report.mismatches {
            println!("不一致: {mismatch}");
        }
    }
    if !report.passed() {
        anyhow::bail!("验证未通过，共 {} 处不一致", report.mismatches.len());
    }
    Ok(())
}

fn print_schema(overview: &SchemaOverview) {
    println!("结构版本: {:?}", overview.version);
    for table in &overview.tables {
        print!("{}", table.render());
    }
}

fn print_stats(stats: &CatalogStats) {
    println!("商品总数: {}", stats.total_products);
    println!("分类数: {}", stats.total_categories);
    println!("品牌数: {}", stats.total_brands);
    println!("部门数: {}", stats.total_departments);
    if let (Some(avg), Some(min), Some(max)) = (
        stats.avg_retail_price,
        stats.min_retail_price,
        stats.max_retail_price,
    ) {
        println!("零售价: 平均 ${avg:.2}，最低 ${min:.2}，最高 ${max:.2}");
    }
    for (department, count) in &stats.products_by_department {
        println!("  {department}: {count}");
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
