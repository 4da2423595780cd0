use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a job over its key range, one sub-batch at a time
    Run {
        #[arg(long, help = "Job file path (JSON)")]
        config: String,

        #[arg(long, help = "Load variables from this .env file before resolving ${VAR} references")]
        env_file: Option<String>,

        #[arg(long, help = "Continue after the last key a previous run of this job committed")]
        resume: bool,

        #[arg(long, help = "Checkpoint directory, defaults to ~/.backfill/state")]
        state_dir: Option<String>,

        #[arg(
            long,
            help = "If specified, writes the JSON summary to this file instead of stdout"
        )]
        output: Option<String>,
    },
    /// List the windows a run would process without writing anything
    Plan {
        #[arg(long, help = "Job file path (JSON)")]
        config: String,

        #[arg(long)]
        env_file: Option<String>,

        #[arg(long, default_value_t = 1000, help = "Stop listing after this many windows")]
        limit: usize,

        #[arg(long)]
        output: Option<String>,
    },
    /// Print the smallest and largest key of the job's table
    Bounds {
        #[arg(long, help = "Job file path (JSON)")]
        config: String,

        #[arg(long)]
        env_file: Option<String>,
    },
    Progress {
        #[arg(long, help = "Job name to inspect; every recorded job when omitted")]
        job: Option<String>,

        #[arg(long)]
        state_dir: Option<String>,

        #[arg(
            long,
            help = "If set, prints the progress information as JSON instead of a table"
        )]
        json: bool,
    },
    /// Test a Postgres connection string
    TestConn {
        #[arg(long)]
        conn_str: String,
    },
}
