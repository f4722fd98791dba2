//! TDS session and result-set cursor backed by `tiberius`
//!
//! A procedure call yields a single token stream. Every metadata token in it
//! opens a new result set; the cursor keeps at most one look-ahead token so
//! rows are pulled from the wire only as fast as the collector asks for them.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use tiberius::{Client, ColumnData, FromSql, QueryItem, QueryStream, ResultMetadata};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::is_valid_procedure_name;
use crate::error::{ConnectionError, InvocationError, Result};
use crate::export::{CellValue, Invocation, ResultSetCursor, Row};

use super::Session;

type TdsClient = Client<Compat<TcpStream>>;

/// An open TDS session
pub struct TdsSession {
    client: Option<TdsClient>,
}

impl TdsSession {
    /// Connect and log in, following one server redirect if asked to
    pub async fn connect(mut config: tiberius::Config, host: &str) -> Result<Self> {
        let client = match Self::login(config.clone(), host).await {
            Ok(client) => client,
            Err(RedirectOr::Redirect { host, port }) => {
                debug!("Server redirected login to {}:{}", host, port);
                config.host(&host);
                config.port(port);
                Self::login(config, &host)
                    .await
                    .map_err(RedirectOr::into_connection_error)?
            }
            Err(RedirectOr::Failed(e)) => return Err(e.into()),
        };

        Ok(Self {
            client: Some(client),
        })
    }

    async fn login(
        config: tiberius::Config,
        host: &str,
    ) -> std::result::Result<TdsClient, RedirectOr> {
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            RedirectOr::Failed(ConnectionError::Unreachable {
                host: host.to_string(),
                message: e.to_string(),
            })
        })?;
        tcp.set_nodelay(true).map_err(|e| {
            RedirectOr::Failed(ConnectionError::Unreachable {
                host: host.to_string(),
                message: e.to_string(),
            })
        })?;

        match Client::connect(config, tcp.compat_write()).await {
            Ok(client) => Ok(client),
            Err(tiberius::error::Error::Routing { host, port }) => {
                Err(RedirectOr::Redirect { host, port })
            }
            Err(e) => Err(RedirectOr::Failed(ConnectionError::from_driver(host, e))),
        }
    }
}

enum RedirectOr {
    Redirect { host: String, port: u16 },
    Failed(ConnectionError),
}

impl RedirectOr {
    fn into_connection_error(self) -> ConnectionError {
        match self {
            RedirectOr::Redirect { host, port } => {
                ConnectionError::Driver(format!("redirected twice, last to {host}:{port}"))
            }
            RedirectOr::Failed(e) => e,
        }
    }
}

#[async_trait]
impl Session for TdsSession {
    async fn call_procedure<'s>(
        &'s mut self,
        procedure: &str,
        invocation: &Invocation,
    ) -> Result<Box<dyn ResultSetCursor + 's>> {
        if !is_valid_procedure_name(procedure) {
            return Err(InvocationError::InvalidProcedure(procedure.to_string()).into());
        }
        let client = self.client.as_mut().ok_or(ConnectionError::NotConnected)?;

        let sql = format!("EXEC {procedure} @P1");
        let root_key = invocation.root_key();
        let timeout = invocation.command_timeout();
        debug!("Executing {} with root key '{}'", procedure, root_key);

        let call = async move {
            let stream = client
                .query(sql, &[&root_key])
                .await
                .map_err(InvocationError::from)?;
            TdsCursor::open(stream).await
        };

        let cursor = tokio::time::timeout(timeout, call).await.map_err(|_| {
            InvocationError::Timeout {
                seconds: timeout.as_secs(),
            }
        })??;

        Ok(Box::new(cursor))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| ConnectionError::Driver(e.to_string()))?;
            info!("Session closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }
}

/// Cursor over the result sets of one procedure call
pub struct TdsCursor<'a> {
    stream: QueryStream<'a>,
    /// Descriptor of the current result set
    columns: Option<Vec<String>>,
    /// Descriptor of the next result set, read while draining the current one
    pending: Option<Vec<String>>,
    /// The current result set has no more rows
    drained: bool,
    /// The token stream is finished
    exhausted: bool,
}

impl<'a> TdsCursor<'a> {
    /// Read up to the first result set
    pub async fn open(stream: QueryStream<'a>) -> Result<Self> {
        let mut cursor = Self {
            stream,
            columns: None,
            pending: None,
            drained: true,
            exhausted: false,
        };
        cursor.advance().await?;
        Ok(cursor)
    }

    /// Skip remaining rows and move onto the next metadata token
    async fn advance(&mut self) -> Result<bool> {
        if let Some(columns) = self.pending.take() {
            self.columns = Some(columns);
            self.drained = false;
            return Ok(true);
        }
        while !self.exhausted {
            match self.stream.try_next().await.map_err(InvocationError::from)? {
                Some(QueryItem::Metadata(meta)) => {
                    self.columns = Some(column_names(&meta));
                    self.drained = false;
                    return Ok(true);
                }
                Some(QueryItem::Row(_)) => {}
                None => self.exhausted = true,
            }
        }
        self.columns = None;
        self.drained = true;
        Ok(false)
    }
}

#[async_trait]
impl ResultSetCursor for TdsCursor<'_> {
    fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    async fn next_set(&mut self) -> Result<bool> {
        self.advance().await
    }

    async fn fetch_many(&mut self, max_rows: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        if self.drained || self.columns.is_none() {
            return Ok(rows);
        }
        rows.reserve(max_rows.min(8192));

        while rows.len() < max_rows {
            match self.stream.try_next().await.map_err(InvocationError::from)? {
                Some(QueryItem::Row(row)) => rows.push(convert_row(row)?),
                Some(QueryItem::Metadata(meta)) => {
                    self.pending = Some(column_names(&meta));
                    self.drained = true;
                    break;
                }
                None => {
                    self.exhausted = true;
                    self.drained = true;
                    break;
                }
            }
        }
        Ok(rows)
    }
}

fn column_names(meta: &ResultMetadata) -> Vec<String> {
    meta.columns().iter().map(|c| c.name().to_string()).collect()
}

fn convert_row(row: tiberius::Row) -> Result<Row> {
    row.into_iter().map(convert_cell).collect()
}

/// Map one native value onto a cell, without reformatting it
pub(crate) fn convert_cell(data: ColumnData<'static>) -> Result<CellValue> {
    let cell = match data {
        ColumnData::U8(v) => v.map(|v| CellValue::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| CellValue::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| CellValue::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(CellValue::Int),
        ColumnData::F32(v) => v.map(|v| CellValue::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(CellValue::Float),
        ColumnData::Bit(v) => v.map(CellValue::Bool),
        ColumnData::String(v) => v.map(|s| CellValue::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map(|g| CellValue::Text(g.to_string())),
        ColumnData::Binary(v) => v.map(|b| CellValue::Bytes(b.into_owned())),
        ColumnData::Numeric(v) => {
            v.map(|n| CellValue::Decimal(n.value() as f64 / 10f64.powi(i32::from(n.scale()))))
        }
        ColumnData::Xml(v) => v.map(|x| CellValue::Text(x.into_owned().into_string())),
        other => convert_temporal(&other)?,
    };
    Ok(cell.unwrap_or(CellValue::Null))
}

fn convert_temporal(data: &ColumnData<'static>) -> Result<Option<CellValue>> {
    let cell = match data {
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .map_err(InvocationError::from)?
                .map(CellValue::DateTime)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .map_err(InvocationError::from)?
            .map(CellValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .map_err(InvocationError::from)?
            .map(CellValue::Time),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)
            .map_err(InvocationError::from)?
            .map(|dt| CellValue::Text(dt.to_rfc3339())),
        other => {
            return Err(InvocationError::Protocol(format!("unsupported column value {other:?}")).into());
        }
    };
    Ok(cell)
}
