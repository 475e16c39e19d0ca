use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use actix_web::http::header;
use actix_web::{web, HttpResponse};
use mongodb::bson::doc;
use mongodb::Collection;
use printpdf::{BuiltinFont, Mm, PdfDocument};

use crate::config::Config;
use crate::error::{Result, ShopError};
use crate::middleware::CurrentUser;
use crate::models::{Order, OrderItem, User};

pub fn invoice_filename(order_id: &str) -> String {
    format!("invoice-{order_id}.pdf")
}

// Ownership gate; runs before any document bytes exist.
pub fn authorize(order: &Order, user: &User) -> Result<()> {
    if order.user.user_id != user.id {
        return Err(ShopError::Forbidden);
    }
    Ok(())
}

// Recomputed from the order's own line items; there is no stored total
// field to trust.
pub fn order_total(order: &Order) -> f64 {
    order
        .items
        .iter()
        .map(|item| item.quantity as f64 * item.product.price)
        .sum()
}

pub fn item_line(item: &OrderItem) -> String {
    format!(
        "{} - {} x ${}",
        item.product.title, item.quantity, item.product.price
    )
}

pub fn total_line(total: f64) -> String {
    format!("Total: ${total:.2}")
}

// Renders the order into a complete PDF byte sequence. Rows flow onto
// fresh pages once the current page runs out of vertical space.
pub fn render_pdf(order: &Order) -> Result<Vec<u8>> {
    let (doc, first_page, first_layer) =
        PdfDocument::new("Invoice", Mm(210.0), Mm(297.0), "invoice");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|err| ShopError::Render(err.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|err| ShopError::Render(err.to_string()))?;

    let mut layer = doc.get_page(first_page).get_layer(first_layer);
    let left = 20.0;
    let mut y = 270.0;

    layer.use_text("Invoice", 26.0, Mm(left), Mm(y), &regular);
    y -= 12.0;
    layer.use_text(
        format!(
            "Order {} - {}",
            order.id,
            order.created_at.format("%Y-%m-%d")
        ),
        10.0,
        Mm(left),
        Mm(y),
        &regular,
    );
    y -= 10.0;
    layer.use_text("-----------------------------", 14.0, Mm(left), Mm(y), &regular);
    y -= 8.0;

    for item in &order.items {
        if y < 25.0 {
            let (page, page_layer) = doc.add_page(Mm(210.0), Mm(297.0), "invoice");
            layer = doc.get_page(page).get_layer(page_layer);
            y = 270.0;
        }
        layer.use_text(item_line(item), 14.0, Mm(left), Mm(y), &regular);
        y -= 8.0;
    }

    if y < 35.0 {
        let (page, page_layer) = doc.add_page(Mm(210.0), Mm(297.0), "invoice");
        layer = doc.get_page(page).get_layer(page_layer);
        y = 270.0;
    }
    layer.use_text("-------------------------", 14.0, Mm(left), Mm(y), &regular);
    y -= 10.0;
    layer.use_text(total_line(order_total(order)), 20.0, Mm(left), Mm(y), &bold);

    let mut bytes = Vec::new();
    doc.save(&mut BufWriter::new(&mut bytes))
        .map_err(|err| ShopError::Render(err.to_string()))?;
    Ok(bytes)
}

// An output destination with an explicit open/write/close lifecycle.
pub trait InvoiceSink {
    fn open(&mut self) -> io::Result<()>;
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

// Durable copy under the invoices directory.
pub struct FileSink {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: PathBuf) -> FileSink {
        FileSink { path, file: None }
    }
}

impl InvoiceSink for FileSink {
    fn open(&mut self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.file = Some(BufWriter::new(File::create(&self.path)?));
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(chunk),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "sink not open")),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        match self.file.take() {
            Some(mut file) => {
                file.flush()?;
                file.get_ref().sync_all()
            }
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "sink not open")),
        }
    }
}

// Response-side buffer; the handler turns it into the HTTP body.
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: Vec<u8>,
    opened: bool,
}

impl BufferSink {
    pub fn new() -> BufferSink {
        BufferSink::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl InvoiceSink for BufferSink {
    fn open(&mut self) -> io::Result<()> {
        self.opened = true;
        self.buf.clear();
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        if !self.opened {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "sink not open"));
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

const CHUNK_SIZE: usize = 8 * 1024;

fn deliver(sink: &mut dyn InvoiceSink, bytes: &[u8]) -> io::Result<()> {
    sink.open()?;
    for chunk in bytes.chunks(CHUNK_SIZE) {
        sink.write_chunk(chunk)?;
    }
    sink.close()
}

// Every sink gets the full byte sequence and its own verdict; one sink
// failing does not stop the others.
pub fn fan_out(bytes: &[u8], sinks: &mut [&mut dyn InvoiceSink]) -> Vec<io::Result<()>> {
    sinks
        .iter_mut()
        .map(|sink| deliver(&mut **sink, bytes))
        .collect()
}

pub async fn get_invoice(
    orders: web::Data<Collection<Order>>,
    config: web::Data<Config>,
    user: CurrentUser,
    order_id: web::Path<String>,
) -> Result<HttpResponse> {
    let order_id = order_id.into_inner();
    let order = orders
        .find_one(doc! {"id": &order_id}, None)
        .await?
        .ok_or(ShopError::OrderNotFound)?;
    authorize(&order, &user.0)?;

    let bytes = render_pdf(&order)?;
    let filename = invoice_filename(&order.id);
    let path = config.invoice_dir.join(&filename);

    // The stored copy is completely written and closed before the response
    // body goes out, so a dropped client cannot leave a truncated file.
    let (results, body) = web::block(move || {
        let mut file = FileSink::new(path);
        let mut buffer = BufferSink::new();
        let results = fan_out(&bytes, &mut [&mut file, &mut buffer]);
        (results, buffer.into_bytes())
    })
    .await
    .map_err(|err| ShopError::Io(io::Error::new(io::ErrorKind::Other, err.to_string())))?;

    let mut results = results.into_iter();
    if let Some(Err(err)) = results.next() {
        // Storage failure does not block delivery, but it is never silent.
        log::error!("failed to store invoice {filename}: {err}");
    }
    if let Some(Err(err)) = results.next() {
        return Err(ShopError::Io(err));
    }

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{filename}\""),
        ))
        .body(body))
}
