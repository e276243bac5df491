//! SQL statements issued by `PgProductStore`.

/// Column list shared by every product read.
pub const PRODUCT_COLUMNS: &str = "id, name, price, stock";

/// Fetches one product by primary key.
pub const SELECT_PRODUCT_BY_ID: &str = "SELECT id, name, price, stock FROM products WHERE id = $1";

/// Inserts a product and returns the assigned id.
pub const INSERT_PRODUCT: &str =
    "INSERT INTO products (name, price, stock) VALUES ($1, $2, $3) RETURNING id";

/// Replaces the mutable fields of a product.
pub const UPDATE_PRODUCT: &str =
    "UPDATE products SET name = $1, price = $2, stock = $3 WHERE id = $4";

/// Removes a product.
pub const DELETE_PRODUCT: &str = "DELETE FROM products WHERE id = $1";

/// Conditional stock decrement. Matches no row when the product is missing
/// or its stock is below the requested quantity; the row lock it takes
/// serializes concurrent checkouts of the same product.
pub const DECREMENT_STOCK: &str = r"
UPDATE products
   SET stock = stock - $1
 WHERE id = $2 AND stock >= $1
RETURNING id, name, price, stock
";

/// Records a committed purchase.
pub const INSERT_TRANSACTION: &str = r"
INSERT INTO transactions (user_id, product_id, quantity, total_price)
VALUES ($1, $2, $3, $4)
RETURNING id, user_id, product_id, quantity, total_price, created_at
";
