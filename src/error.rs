use thiserror::Error;

#[derive(Debug, Error)]
pub enum TurnoverError {
    #[error("不支持的文件格式: .{0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFileType(String),

    #[error("未找到导入文件: {0}")]
    FileNotFound(String),

    #[error("导入路径不是文件: {0}")]
    NotAFile(String),

    #[error("打开表格失败: {0}")]
    WorkbookOpen(String),

    #[error("表格中未找到工作表")]
    NoWorksheet,

    #[error("读取工作表失败: {0}")]
    SheetRead(String),

    #[error("读取 CSV 失败: {0}")]
    CsvRead(#[from] csv::Error),

    #[error("未找到有效的编号和行业对应关系")]
    EmptyCodeTable,

    #[error("请先上传编号表")]
    CodeMapEmpty,

    #[error("未找到日期 {0} 的数据")]
    UnknownDate(String),

    #[error("无数据可导出")]
    NothingToExport,

    #[error("生成 xlsx 失败: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 序列化失败: {0}")]
    Json(#[from] serde_json::Error),
}

impl TurnoverError {
    /// Stable category used by the adapter binary and the frontend notification layer.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedFileType(_)
            | Self::FileNotFound(_)
            | Self::NotAFile(_)
            | Self::WorkbookOpen(_)
            | Self::NoWorksheet
            | Self::SheetRead(_)
            | Self::CsvRead(_)
            | Self::EmptyCodeTable => "MALFORMED_UPLOAD",
            Self::CodeMapEmpty | Self::UnknownDate(_) => "VALIDATION_ERROR",
            Self::NothingToExport => "NO_DATA_ERROR",
            Self::Xlsx(_) | Self::Io(_) | Self::Json(_) => "IO_ERROR",
        }
    }
}

pub type TurnoverResult<T> = Result<T, TurnoverError>;
